use std::collections::HashSet;

use tracing::debug;

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::state::ConversationState;
use secureorder_core::traits::{DecisionGenerator, GenerationRequest};
use secureorder_core::types::{Entry, Role, StepName, ToolCall, ToolDefinition};

/// Ask the generator for the next assistant entry, with or without tool calls.
pub async fn run(
    generator: &dyn DecisionGenerator,
    instruction: &str,
    state: &ConversationState,
    tools: Vec<ToolDefinition>,
) -> Result<Entry> {
    let request = GenerationRequest {
        step: StepName::Researcher,
        instruction: instruction.to_string(),
        entries: state.entries().to_vec(),
        tools,
    };
    let entry = generator.generate(request).await?;
    normalize(entry)
}

/// Force the generator's reply into a valid assistant entry.
///
/// Calls without an id, or with an id already used in the same reply, get a
/// fresh `call_<uuid>` id.
fn normalize(mut entry: Entry) -> Result<Entry> {
    if entry.role != Role::Assistant {
        return Err(SecureOrderError::GeneratorParse(format!(
            "generator returned a {} entry",
            entry.role
        )));
    }
    entry.tool_call_id = None;

    let mut seen = HashSet::new();
    for call in &mut entry.tool_calls {
        if call.id.is_empty() || !seen.insert(call.id.clone()) {
            let fresh = ToolCall::fresh_id();
            debug!(tool = %call.name, id = %fresh, "Assigned tool call id");
            call.id = fresh.clone();
            seen.insert(fresh);
        }
    }

    if entry.timestamp.is_none() {
        entry.timestamp = Some(chrono::Utc::now());
    }
    entry.validate()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secureorder_test_utils::{call, requests_tools, ScriptedGenerator};
    use serde_json::json;

    #[tokio::test]
    async fn passes_instruction_tools_and_history() {
        let generator = ScriptedGenerator::from_entries(vec![Entry::assistant_text("done")]);
        let state = ConversationState::from_entries(vec![Entry::user("hello")]).unwrap();
        let tools = vec![ToolDefinition {
            name: "search_inventory".into(),
            description: "d".into(),
            input_schema: json!({}),
        }];

        let entry = run(&generator, "research", &state, tools).await.unwrap();
        assert_eq!(entry.text(), "done");

        let requests = generator.requests();
        let req = &requests[0];
        assert_eq!(req.step, StepName::Researcher);
        assert_eq!(req.instruction, "research");
        assert_eq!(req.entries.len(), 1);
        assert_eq!(req.tools.len(), 1);
    }

    #[tokio::test]
    async fn assigns_missing_and_duplicate_ids() {
        let mut first = ToolCall::with_json("a", json!({}));
        first.id = String::new();
        let reply = requests_tools(vec![
            first,
            call("dup", "b", json!({})),
            call("dup", "c", json!({})),
        ]);
        let generator = ScriptedGenerator::from_entries(vec![reply]);
        let state = ConversationState::from_entries(vec![Entry::user("go")]).unwrap();

        let entry = run(&generator, "i", &state, vec![]).await.unwrap();
        let ids: Vec<&str> = entry.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert!(ids[0].starts_with("call_"));
        assert_eq!(ids[1], "dup");
        assert_ne!(ids[2], "dup");
        assert!(entry.validate().is_ok());
    }

    #[tokio::test]
    async fn rejects_non_assistant_replies() {
        let generator = ScriptedGenerator::from_entries(vec![Entry::user("I am not the model")]);
        let state = ConversationState::from_entries(vec![Entry::user("go")]).unwrap();
        let err = run(&generator, "i", &state, vec![]).await.unwrap_err();
        assert!(matches!(err, SecureOrderError::GeneratorParse(_)));
    }
}
