use std::time::Duration;

use serde_json::json;

use secureorder_core::types::{ParamType, ToolCall, ToolErrorKind};
use secureorder_test_utils::{FailingTool, PanickingTool, SlowTool, StaticTool};
use secureorder_tools::ToolRegistry;

#[tokio::test]
async fn panicking_tool_is_contained() {
    let mut registry = ToolRegistry::new();
    registry.register(PanickingTool);

    let result = registry
        .invoke(&ToolCall::with_json("panicking_tool", json!({})))
        .await;
    assert!(!result.ok);
    assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
    assert!(result.error.unwrap().message.contains("panicked"));
}

#[tokio::test]
async fn failing_tool_reports_its_message() {
    let mut registry = ToolRegistry::new();
    registry.register(FailingTool::new("flaky", "upstream unavailable"));

    let result = registry.invoke(&ToolCall::with_json("flaky", json!({}))).await;
    assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
    assert_eq!(result.error.unwrap().message, "upstream unavailable");
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out() {
    let mut registry = ToolRegistry::new();
    registry.register(SlowTool::new("sleepy", Duration::from_secs(60)).with_timeout(1));

    let result = registry.invoke(&ToolCall::with_json("sleepy", json!({}))).await;
    assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
    assert!(result.error.unwrap().message.contains("timeout after 1s"));
}

#[tokio::test(start_paused = true)]
async fn registry_default_timeout_applies() {
    let mut registry = ToolRegistry::new().with_default_timeout(2);
    registry.register(SlowTool::new("sleepy", Duration::from_secs(3)));

    let result = registry.invoke(&ToolCall::with_json("sleepy", json!({}))).await;
    assert!(!result.ok);

    let mut registry = ToolRegistry::new().with_default_timeout(5);
    registry.register(SlowTool::new("sleepy", Duration::from_secs(3)));
    let result = registry.invoke(&ToolCall::with_json("sleepy", json!({}))).await;
    assert!(result.ok);
    assert_eq!(result.payload.unwrap()["slept_ms"], 3000);
}

#[tokio::test]
async fn validated_arguments_reach_the_body() {
    let mut registry = ToolRegistry::new();
    registry.register(
        StaticTool::new("echo", json!({ "type": "echo" })).with_param("qty", ParamType::Integer),
    );

    let result = registry
        .invoke(&ToolCall::with_json("echo", json!({ "qty": "7" })))
        .await;
    assert!(result.ok);
    assert_eq!(result.payload.unwrap()["args"]["qty"], 7);

    let result = registry.invoke(&ToolCall::with_json("echo", json!({}))).await;
    assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
}

#[test]
fn later_registration_replaces_earlier() {
    let mut registry = ToolRegistry::new();
    registry.register(StaticTool::new("dup", json!(1)));
    registry.register(FailingTool::new("dup", "second"));
    assert_eq!(registry.len(), 1);
    assert!(registry.unregister("dup"));
    assert!(registry.is_empty());
}
