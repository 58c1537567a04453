use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use secureorder_core::event::EventBus;
use secureorder_core::types::{EngineEvent, Entry, SessionId, ToolCall};
use secureorder_tools::ToolRegistry;

/// Execute a batch of tool calls and return one tool entry per call, in call order.
///
/// At most `fan_out` calls run at the same time. Failures become `ok=false`
/// results and never stop the rest of the batch.
pub async fn run(
    registry: &ToolRegistry,
    calls: &[ToolCall],
    fan_out: usize,
    session_id: &SessionId,
    event_bus: &EventBus,
) -> Vec<Entry> {
    debug!(session_id = %session_id, calls = calls.len(), fan_out, "Executing tool batch");

    let futures = calls
        .iter()
        .map(|call| async move {
            event_bus.publish(EngineEvent::ToolStarted {
                session_id: session_id.clone(),
                call: call.clone(),
            });

            let result = registry.invoke(call).await;
            info!(
                session_id = %session_id,
                tool = %call.name,
                ok = result.ok,
                "Tool call finished"
            );

            event_bus.publish(EngineEvent::ToolFinished {
                session_id: session_id.clone(),
                name: call.name.clone(),
                result: result.clone(),
            });
            Entry::tool_result(call.id.clone(), &result)
        })
        .collect::<Vec<_>>();

    stream::iter(futures)
        .buffered(fan_out.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use secureorder_core::types::ToolErrorKind;
    use secureorder_test_utils::{call, FailingTool, SlowTool, StaticTool};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(SlowTool::new("slow", Duration::from_millis(50)));
        reg.register(StaticTool::new("fast", json!({ "type": "fast" })));
        reg.register(FailingTool::new("broken", "down for maintenance"));
        reg
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_call_order() {
        let calls = vec![
            call("c1", "slow", json!({})),
            call("c2", "fast", json!({})),
            call("c3", "broken", json!({})),
            call("c4", "missing", json!({})),
        ];
        let bus = EventBus::default();
        let entries = run(&registry(), &calls, 4, &SessionId::from("s"), &bus).await;

        let ids: Vec<_> = entries.iter().map(|e| e.tool_call_id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);

        let kinds: Vec<_> = entries
            .iter()
            .map(|e| e.as_tool_result().unwrap().error_kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                None,
                Some(ToolErrorKind::ToolExecutionFailed),
                Some(ToolErrorKind::ToolNotFound),
            ]
        );
    }

    #[tokio::test]
    async fn publishes_tool_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let calls = vec![call("c1", "fast", json!({}))];
        run(&registry(), &calls, 1, &SessionId::from("s"), &bus).await;

        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ToolStarted { .. }));
        match rx.recv().await.unwrap() {
            EngineEvent::ToolFinished { name, result, .. } => {
                assert_eq!(name, "fast");
                assert!(result.ok);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn zero_fan_out_still_progresses() {
        let calls = vec![call("c1", "fast", json!({})), call("c2", "fast", json!({}))];
        let entries = run(&registry(), &calls, 0, &SessionId::from("s"), &EventBus::default()).await;
        assert_eq!(entries.len(), 2);
    }
}
