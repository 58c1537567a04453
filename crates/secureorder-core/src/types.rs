use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Result, SecureOrderError};
use crate::state::ConversationState;

/// Opaque session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an entry in the conversation log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// Entry content: plain text or a structured JSON payload.
///
/// Serialized untagged, so a JSON string always reads back as `Text`.
/// `Structured` must therefore never hold a bare string; [`Entry::validate`]
/// rejects one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

impl Content {
    /// Render the content as text (structured payloads as compact JSON).
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Structured(value) => value.to_string(),
        }
    }
}

/// A request, embedded in an assistant entry, to invoke a named tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: Self::fresh_id(),
            name: name.into(),
            arguments,
        }
    }

    /// A new unique call id of the form `call_<uuid>`.
    pub fn fresh_id() -> String {
        format!("call_{}", Uuid::new_v4().simple())
    }

    /// Build a call from a JSON object literal. Non-object values yield no arguments.
    pub fn with_json(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, arguments)
    }
}

/// Classification of a failed tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolErrorKind {
    InvalidArguments,
    ToolExecutionFailed,
    ToolNotFound,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolErrorKind::InvalidArguments => "InvalidArguments",
            ToolErrorKind::ToolExecutionFailed => "ToolExecutionFailed",
            ToolErrorKind::ToolNotFound => "ToolNotFound",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// Structured outcome of executing one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(ToolError {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn to_value(&self) -> Value {
        match (&self.payload, &self.error) {
            (_, Some(err)) => json!({
                "ok": self.ok,
                "error": { "kind": err.kind, "message": err.message },
            }),
            (Some(payload), None) => json!({ "ok": self.ok, "payload": payload }),
            (None, None) => json!({ "ok": self.ok }),
        }
    }
}

/// One immutable unit of the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
            tool_calls,
            tool_call_id: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Structured(result.to_value()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            timestamp: Some(Utc::now()),
        }
    }

    /// Parse an entry from untyped JSON. Missing, unknown or mistyped fields
    /// and structurally invalid entries give `MalformedEntry`.
    pub fn parse(value: Value) -> Result<Self> {
        let entry: Entry = serde_json::from_value(value)
            .map_err(|e| SecureOrderError::MalformedEntry(e.to_string()))?;
        entry.validate()?;
        Ok(entry)
    }

    /// Check the structural rules every logged entry must satisfy.
    pub fn validate(&self) -> Result<()> {
        match self.role {
            Role::Tool => {
                if self.tool_call_id.as_deref().map_or(true, str::is_empty) {
                    return Err(SecureOrderError::MalformedEntry(
                        "tool entry is missing tool_call_id".into(),
                    ));
                }
            }
            Role::User => {
                if self.tool_call_id.is_some() {
                    return Err(SecureOrderError::MalformedEntry(
                        "user entry must not carry tool_call_id".into(),
                    ));
                }
            }
            Role::Assistant => {}
        }

        if let Content::Structured(Value::String(_)) = self.content {
            return Err(SecureOrderError::MalformedEntry(
                "structured content must not be a bare string; use text content".into(),
            ));
        }

        if !self.tool_calls.is_empty() && self.role != Role::Assistant {
            return Err(SecureOrderError::MalformedEntry(format!(
                "{} entry must not carry tool_calls",
                self.role
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for call in &self.tool_calls {
            if call.name.trim().is_empty() {
                return Err(SecureOrderError::MalformedEntry(
                    "tool call is missing a name".into(),
                ));
            }
            if call.id.is_empty() {
                return Err(SecureOrderError::MalformedEntry(format!(
                    "tool call '{}' is missing an id",
                    call.name
                )));
            }
            if !seen.insert(call.id.as_str()) {
                return Err(SecureOrderError::MalformedEntry(format!(
                    "duplicate tool call id '{}'",
                    call.id
                )));
            }
        }
        Ok(())
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Decode the tool result carried by a `tool` entry.
    pub fn as_tool_result(&self) -> Option<ToolResult> {
        if self.role != Role::Tool {
            return None;
        }
        match &self.content {
            Content::Structured(value) => serde_json::from_value(value.clone()).ok(),
            Content::Text(_) => None,
        }
    }
}

/// Named steps of the execution graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Researcher,
    ToolExecution,
    Analyzer,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Researcher => "researcher",
            StepName::ToolExecution => "tool_execution",
            StepName::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = SecureOrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "researcher" => Ok(StepName::Researcher),
            "tool_execution" => Ok(StepName::ToolExecution),
            "analyzer" => Ok(StepName::Analyzer),
            other => Err(SecureOrderError::Checkpoint(format!(
                "unknown step name '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SecureOrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "suspended" => Ok(SessionStatus::Suspended),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(SecureOrderError::Checkpoint(format!(
                "unknown session status '{}'",
                other
            ))),
        }
    }
}

/// Error recorded on a session whose last run failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    pub kind: String,
    pub message: String,
}

impl From<&SecureOrderError> for RunFailure {
    fn from(e: &SecureOrderError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// A conversation session and its execution control state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub state: ConversationState,
    /// Set while suspended; the step awaiting approval.
    #[serde(default)]
    pub pending_step: Option<StepName>,
    pub status: SessionStatus,
    /// Step the engine executes next while the session is running.
    #[serde(default)]
    pub next_step: Option<StepName>,
    #[serde(default)]
    pub last_error: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            state: ConversationState::new(),
            pending_step: None,
            status: SessionStatus::Running,
            next_step: Some(StepName::Researcher),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.status == SessionStatus::Suspended
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            entries: self.state.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight listing row for a stored session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub entries: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of one `run` or `resume` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// The Analyzer produced the final answer.
    Completed { session_id: SessionId, answer: Entry },
    /// The run stopped before executing tools and awaits approval.
    Suspended {
        session_id: SessionId,
        pending_calls: Vec<ToolCall>,
    },
}

impl RunResult {
    pub fn session_id(&self) -> &SessionId {
        match self {
            RunResult::Completed { session_id, .. } | RunResult::Suspended { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunResult::Suspended { .. })
    }

    pub fn answer(&self) -> Option<&Entry> {
        match self {
            RunResult::Completed { answer, .. } => Some(answer),
            RunResult::Suspended { .. } => None,
        }
    }
}

/// JSON value type of a declared tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
        }
    }
}

/// Declared parameter of a tool contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default,
        }
    }
}

/// Tool definition handed to the decision generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Progress event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RunStarted { session_id: SessionId, from: StepName },
    StepStarted { session_id: SessionId, step: StepName },
    StepCompleted {
        session_id: SessionId,
        step: StepName,
        appended: usize,
        elapsed_ms: u64,
    },
    ToolStarted { session_id: SessionId, call: ToolCall },
    ToolFinished {
        session_id: SessionId,
        name: String,
        result: ToolResult,
    },
    Suspended {
        session_id: SessionId,
        pending_calls: Vec<ToolCall>,
    },
    RunCompleted { session_id: SessionId, steps: usize },
    RunFailed { session_id: SessionId, kind: String, message: String },
}
