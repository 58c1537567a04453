use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecureOrderError {
    // Conversation errors
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Session protocol errors
    #[error("Session {session_id} is awaiting approval; resume it before sending new input")]
    AwaitingApproval { session_id: String },

    #[error("Session {session_id} is not suspended (status: {status})")]
    NotSuspended { session_id: String, status: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Decision generator errors
    #[error("Decision generator failed: {0}")]
    Generator(String),

    #[error("Decision generator response parse error: {0}")]
    GeneratorParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Engine errors
    #[error("Run exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SecureOrderError {
    /// Stable, user-facing name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedEntry(_) => "MalformedEntry",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::AwaitingApproval { .. } => "AwaitingApproval",
            Self::NotSuspended { .. } => "NotSuspended",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::Generator(_) | Self::GeneratorParse(_) => "GeneratorFailed",
            Self::ToolNotFound(_) => "ToolNotFound",
            Self::ToolExecution { .. } | Self::ToolTimeout { .. } => "ToolExecutionFailed",
            Self::ToolValidation(_) => "InvalidArguments",
            Self::MaxStepsExceeded(_) => "MaxStepsExceeded",
            Self::Cancelled => "Cancelled",
            Self::Config(_) | Self::ConfigNotFound(_) => "Config",
            Self::Checkpoint(_) => "CheckpointFailed",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    /// Errors the caller caused by using the session protocol out of order.
    /// These are rejected before the session is touched.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::AwaitingApproval { .. } | Self::NotSuspended { .. } | Self::MalformedEntry(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SecureOrderError>;
