//! Action-request tools. They never mutate anything; they describe an action
//! for a human to approve.

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::str_arg;

fn action_request(action: &str, payload: Value) -> Value {
    json!({
        "type": "action_request",
        "action": action,
        "payload": payload,
    })
}

pub struct RequestPlaceOrderTool;

impl Tool for RequestPlaceOrderTool {
    fn name(&self) -> &str {
        "request_place_order"
    }

    fn description(&self) -> &str {
        "Create a pending place-order action (human approval required)."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "order_payload",
            ParamType::Object,
            "The order to place, e.g. {\"product_id\": \"p1\", \"quantity\": 2}",
        )]
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let payload = args
                .get("order_payload")
                .filter(|v| v.is_object())
                .cloned()
                .ok_or_else(|| {
                    SecureOrderError::ToolValidation("'order_payload' must be an object".into())
                })?;
            Ok(action_request("place_order", payload))
        })
    }
}

pub struct RequestCancelOrderTool;

impl Tool for RequestCancelOrderTool {
    fn name(&self) -> &str {
        "request_cancel_order"
    }

    fn description(&self) -> &str {
        "Create a pending cancel-order action (human approval required)."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "order_id",
            ParamType::String,
            "The order identifier to cancel",
        )]
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let order_id = str_arg(&args, "order_id")?;
            Ok(action_request("cancel_order", json!({ "order_id": order_id })))
        })
    }
}
