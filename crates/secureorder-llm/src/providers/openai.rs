use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use secureorder_core::config::ModelConfig;
use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::{DecisionGenerator, GenerationRequest};
use secureorder_core::types::*;

use super::presets;

/// OpenAI-compatible chat-completions generator. Works with Groq, OpenAI, Ollama, OpenRouter, etc.
pub struct OpenAiGenerator {
    http: Client,
    config: ModelConfig,
    url: String,
}

impl OpenAiGenerator {
    pub fn new(config: ModelConfig) -> Self {
        let url = presets::resolve_url(&config);
        Self {
            http: Client::new(),
            config,
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OaiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
    function: OaiFunction,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Map the step instruction plus conversation entries onto chat messages.
pub(crate) fn convert_entries(instruction: &str, entries: &[Entry]) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::with_capacity(entries.len() + 1);
    oai_msgs.push(OaiMessage::text("system", instruction.to_string()));

    for entry in entries {
        match entry.role {
            Role::User => oai_msgs.push(OaiMessage::text("user", entry.text())),
            Role::Assistant if entry.tool_calls.is_empty() => {
                oai_msgs.push(OaiMessage::text("assistant", entry.text()))
            }
            Role::Assistant => {
                let text = entry.text();
                let calls = entry
                    .tool_calls
                    .iter()
                    .map(|c| OaiToolCall {
                        id: Some(c.id.clone()),
                        r#type: Some("function".to_string()),
                        function: OaiFunction {
                            name: c.name.clone(),
                            arguments: Value::Object(c.arguments.clone()).to_string(),
                        },
                    })
                    .collect();
                oai_msgs.push(OaiMessage {
                    role: "assistant".to_string(),
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: Some(calls),
                    tool_call_id: None,
                });
            }
            Role::Tool => {
                let content = match &entry.content {
                    Content::Text(s) => s.clone(),
                    Content::Structured(v) => v.to_string(),
                };
                oai_msgs.push(OaiMessage {
                    role: "tool".to_string(),
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: entry.tool_call_id.clone(),
                });
            }
        }
    }

    oai_msgs
}

/// Turn a chat-completions response body into one assistant entry.
pub(crate) fn parse_response(body: &str) -> Result<Entry> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SecureOrderError::GeneratorParse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SecureOrderError::GeneratorParse("response has no choices".into()))?;

    let text = choice.message.content.unwrap_or_default();
    let raw_calls = choice.message.tool_calls.unwrap_or_default();
    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
        tool_calls = raw_calls.len(),
        "Parsed generator response"
    );

    if raw_calls.is_empty() {
        return Ok(Entry::assistant_text(text));
    }

    let mut calls = Vec::with_capacity(raw_calls.len());
    for raw in raw_calls {
        let arguments = parse_arguments(&raw.function.name, &raw.function.arguments)?;
        let mut call = ToolCall::new(raw.function.name, arguments);
        if let Some(id) = raw.id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        calls.push(call);
    }
    Ok(Entry::assistant_tool_calls(text, calls))
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(SecureOrderError::GeneratorParse(format!(
            "arguments for '{}' are not an object: {}",
            tool, other
        ))),
        Err(e) => Err(SecureOrderError::GeneratorParse(format!(
            "arguments for '{}' are not valid JSON: {}",
            tool, e
        ))),
    }
}

fn request_error(e: reqwest::Error) -> SecureOrderError {
    if e.is_timeout() {
        SecureOrderError::Generator(format!("timeout: {}", e))
    } else if e.is_connect() {
        SecureOrderError::Generator(format!("connection failed: {}", e))
    } else {
        SecureOrderError::Generator(e.to_string())
    }
}

impl DecisionGenerator for OpenAiGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<Entry>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: self.config.model_id.clone(),
                messages: convert_entries(&request.instruction, &request.entries),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                stream: false,
                tools: convert_tools(&request.tools),
            };

            let mut req = self.http.post(&self.url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            for (k, v) in presets::extra_headers(&self.config.provider) {
                req = req.header(*k, *v);
            }

            debug!(
                step = %request.step,
                model = %self.config.model_id,
                messages = body.messages.len(),
                tools = body.tools.len(),
                "Sending chat completion request"
            );

            let response = req.send().await.map_err(request_error)?;
            let status = response.status();
            let text = response.text().await.map_err(request_error)?;

            if !status.is_success() {
                return Err(SecureOrderError::Generator(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    text
                )));
            }

            parse_response(&text)
        })
    }
}
