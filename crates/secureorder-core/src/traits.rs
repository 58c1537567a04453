use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::*;

/// The external text/decision generator behind the Researcher and Analyzer steps.
pub trait DecisionGenerator: Send + Sync + 'static {
    /// Produce exactly one new entry for the given request.
    ///
    /// Omitting tool calls from the returned entry is the only way to signal
    /// "no further tool use".
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<Entry>>;
}

/// Everything the generator sees for one step invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub step: StepName,
    /// Fixed role instruction for the step.
    pub instruction: String,
    /// The full conversation log so far.
    pub entries: Vec<Entry>,
    /// Tools the generator may request; empty for the Analyzer.
    pub tools: Vec<ToolDefinition>,
}

/// Tool — one callable contract in the registry.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in generator tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared parameters; arguments are validated against these before `execute`.
    fn params(&self) -> Vec<ParamSpec>;

    /// Run the tool body with already-validated arguments.
    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>>;

    /// Timeout in seconds for this tool. `None` defers to the registry default.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}
