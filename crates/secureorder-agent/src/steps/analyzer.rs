use tracing::warn;

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::state::ConversationState;
use secureorder_core::traits::{DecisionGenerator, GenerationRequest};
use secureorder_core::types::{Entry, Role, StepName};

/// Produce the final answer. The generator gets no tool definitions, and any
/// tool calls it attaches anyway are dropped.
pub async fn run(
    generator: &dyn DecisionGenerator,
    instruction: &str,
    state: &ConversationState,
) -> Result<Entry> {
    let request = GenerationRequest {
        step: StepName::Analyzer,
        instruction: instruction.to_string(),
        entries: state.entries().to_vec(),
        tools: Vec::new(),
    };
    let mut entry = generator.generate(request).await?;

    if entry.role != Role::Assistant {
        return Err(SecureOrderError::GeneratorParse(format!(
            "generator returned a {} entry",
            entry.role
        )));
    }
    if !entry.tool_calls.is_empty() {
        let names: Vec<&str> = entry.tool_calls.iter().map(|c| c.name.as_str()).collect();
        warn!(tools = ?names, "Analyzer reply carried tool calls; stripping them");
        entry.tool_calls.clear();
    }
    entry.tool_call_id = None;
    if entry.timestamp.is_none() {
        entry.timestamp = Some(chrono::Utc::now());
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secureorder_test_utils::{call, requests_tools, ScriptedGenerator};
    use serde_json::json;

    #[tokio::test]
    async fn strips_tool_calls() {
        let reply = requests_tools(vec![call("c1", "fetch_order_status", json!({}))]);
        let generator = ScriptedGenerator::from_entries(vec![reply]);
        let state = ConversationState::from_entries(vec![
            Entry::user("q"),
            Entry::assistant_text("enough"),
        ])
        .unwrap();

        let entry = run(&generator, "analyze", &state).await.unwrap();
        assert!(!entry.has_tool_calls());

        let requests = generator.requests();
        let req = &requests[0];
        assert_eq!(req.step, StepName::Analyzer);
        assert!(req.tools.is_empty());
        assert_eq!(req.entries.len(), 2);
    }

    #[tokio::test]
    async fn propagates_generator_errors() {
        let generator =
            ScriptedGenerator::new(vec![Err(SecureOrderError::Generator("HTTP 500".into()))]);
        let state = ConversationState::from_entries(vec![Entry::user("q")]).unwrap();
        assert!(matches!(
            run(&generator, "a", &state).await,
            Err(SecureOrderError::Generator(_))
        ));
    }
}
