use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::state::ConversationState;
use secureorder_core::types::{Role, StepName};

/// Decide where the Researcher's output goes next.
///
/// `ToolExecution` iff the last entry is an assistant entry requesting tools,
/// `Analyzer` otherwise. Any other shape of state is an invariant violation.
pub fn route(state: &ConversationState) -> Result<StepName> {
    let last = state.last_entry().ok_or_else(|| {
        SecureOrderError::InvariantViolation("router reached with an empty conversation".into())
    })?;

    if last.role != Role::Assistant {
        return Err(SecureOrderError::InvariantViolation(format!(
            "router expected an assistant entry, found {}",
            last.role
        )));
    }

    if state.has_pending_tool_calls() {
        Ok(StepName::ToolExecution)
    } else {
        Ok(StepName::Analyzer)
    }
}

/// Fixed successor table for the steps that do not branch.
pub fn successor(step: StepName) -> Option<StepName> {
    match step {
        StepName::Researcher => None,
        StepName::ToolExecution => Some(StepName::Researcher),
        StepName::Analyzer => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secureorder_core::types::{Entry, ToolCall, ToolResult};
    use serde_json::json;

    #[test]
    fn routes_tool_requests() {
        let call = ToolCall::with_json("fetch_order_status", json!({ "order_id": "1001" }));
        let state = ConversationState::from_entries(vec![
            Entry::user("status of 1001?"),
            Entry::assistant_tool_calls("", vec![call]),
        ])
        .unwrap();
        assert_eq!(route(&state).unwrap(), StepName::ToolExecution);
    }

    #[test]
    fn routes_plain_answers_to_analyzer() {
        let state = ConversationState::from_entries(vec![
            Entry::user("hi"),
            Entry::assistant_text("enough data"),
        ])
        .unwrap();
        assert_eq!(route(&state).unwrap(), StepName::Analyzer);
    }

    #[test]
    fn rejects_non_assistant_tail() {
        let empty = ConversationState::new();
        assert!(matches!(
            route(&empty),
            Err(SecureOrderError::InvariantViolation(_))
        ));

        let state = ConversationState::from_entries(vec![
            Entry::user("hi"),
            Entry::tool_result("call_1", &ToolResult::success(json!({}))),
        ])
        .unwrap();
        assert!(matches!(
            route(&state),
            Err(SecureOrderError::InvariantViolation(_))
        ));
    }

    #[test]
    fn successor_table() {
        assert_eq!(successor(StepName::ToolExecution), Some(StepName::Researcher));
        assert_eq!(successor(StepName::Analyzer), None);
        assert_eq!(successor(StepName::Researcher), None);
    }
}
