use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use secureorder_core::config::ToolsConfig;
use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::Tool;
use secureorder_core::types::{ToolCall, ToolDefinition, ToolErrorKind, ToolResult};

use crate::builtin;
use crate::catalog::Catalog;
use crate::schema;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout_secs: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the timeout applied to tools that do not declare their own.
    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Register a tool. A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced tool registration");
        }
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Look a tool up by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| SecureOrderError::ToolNotFound(name.to_string()))
    }

    /// List registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions for the generator, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: schema::json_schema(&t.params()),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke one tool call. Never fails: every outcome is a structured `ToolResult`.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        self.invoke_named(&call.name, &call.arguments).await
    }

    pub async fn invoke_named(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult {
        let tool = match self.resolve(name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = %name, "Requested tool is not registered");
                return ToolResult::failure(ToolErrorKind::ToolNotFound, e.to_string());
            }
        };

        let args = match schema::validate_arguments(&tool.params(), arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(tool = %name, error = %e, "Rejected tool arguments");
                return ToolResult::failure(ToolErrorKind::InvalidArguments, message_of(e));
            }
        };

        let timeout_secs = tool.timeout_secs().unwrap_or(self.default_timeout_secs);

        // The body runs on its own task so a panic stays inside this call.
        let handle = tokio::spawn(async move { tool.execute(args).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(Duration::from_secs(timeout_secs), handle).await {
            Ok(Ok(Ok(payload))) => ToolResult::success(payload),
            Ok(Ok(Err(SecureOrderError::ToolValidation(msg)))) => {
                ToolResult::failure(ToolErrorKind::InvalidArguments, msg)
            }
            Ok(Ok(Err(e))) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                ToolResult::failure(ToolErrorKind::ToolExecutionFailed, message_of(e))
            }
            Ok(Err(join_err)) => {
                warn!(tool = %name, error = %join_err, "Tool task aborted");
                ToolResult::failure(
                    ToolErrorKind::ToolExecutionFailed,
                    format!("tool '{}' panicked", name),
                )
            }
            Err(_) => {
                abort.abort();
                let e = SecureOrderError::ToolTimeout {
                    tool: name.to_string(),
                    timeout_secs,
                };
                warn!(tool = %name, timeout_secs, "Tool timed out");
                ToolResult::failure(ToolErrorKind::ToolExecutionFailed, e.to_string())
            }
        }
    }

    /// Create a registry with every built-in tool, bound to `catalog` and the tool credentials.
    pub fn with_builtins(catalog: Arc<Catalog>, config: &ToolsConfig) -> Self {
        let mut registry = Self::new().with_default_timeout(config.timeout_secs);

        // ── Catalog ─────────────────────────────────────────────
        registry.register(builtin::orders::FetchOrderStatusTool::new(catalog.clone()));
        registry.register(builtin::inventory::SearchInventoryTool::new(catalog.clone()));
        registry.register(builtin::orders::AuditOrderSecurityTool::new(catalog));

        // ── Live data ───────────────────────────────────────────
        registry.register(builtin::market::MaterialPriceTool::new());
        registry.register(builtin::weather::ShippingWeatherTool::new(
            config.openweather_api_key.clone(),
        ));
        registry.register(builtin::currency::CurrencyConvertTool::new(
            config.exchange_rate_api_key.clone(),
        ));

        // ── Action requests ─────────────────────────────────────
        registry.register(builtin::actions::RequestPlaceOrderTool);
        registry.register(builtin::actions::RequestCancelOrderTool);

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the error-class prefix so tool results carry only the detail.
fn message_of(e: SecureOrderError) -> String {
    match e {
        SecureOrderError::ToolValidation(msg) => msg,
        SecureOrderError::ToolExecution { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins(Arc::new(Catalog::seeded()), &ToolsConfig::default())
    }

    #[test]
    fn builtins_are_registered() {
        let reg = registry();
        assert_eq!(
            reg.list(),
            vec![
                "audit_order_security",
                "convert_currency",
                "fetch_order_status",
                "get_material_price",
                "get_shipping_weather",
                "request_cancel_order",
                "request_place_order",
                "search_inventory",
            ]
        );
        let defs = reg.definitions();
        assert_eq!(defs.len(), 8);
        let currency = defs.iter().find(|d| d.name == "convert_currency").unwrap();
        assert_eq!(currency.input_schema["properties"]["amount"]["type"], "number");
    }

    #[test]
    fn resolve_unknown() {
        let err = registry().resolve("drop_tables").err().unwrap();
        assert!(matches!(err, SecureOrderError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn invoke_success() {
        let call = ToolCall::with_json("fetch_order_status", json!({ "order_id": "1002" }));
        let result = registry().invoke(&call).await;
        assert!(result.ok);
        assert_eq!(result.payload.unwrap()["order"]["status"], "Processing");
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_data() {
        let call = ToolCall::with_json("drop_tables", json!({}));
        let result = registry().invoke(&call).await;
        assert!(!result.ok);
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolNotFound));
    }

    #[tokio::test]
    async fn invoke_rejects_expression_amount() {
        let call = ToolCall::with_json(
            "convert_currency",
            json!({ "amount": "88 * 0.5", "from_curr": "USD", "to_curr": "PKR" }),
        );
        let result = registry().invoke(&call).await;
        assert!(!result.ok);
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
        assert!(result.error.unwrap().message.contains("amount"));
    }

    #[tokio::test]
    async fn search_default_argument_applies() {
        let call = ToolCall::with_json("search_inventory", json!({}));
        let result = registry().invoke(&call).await;
        assert!(result.ok);
        assert_eq!(result.payload.unwrap()["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_credentials_fail_as_execution_errors() {
        let call = ToolCall::with_json("get_shipping_weather", json!({ "city": "Lahore" }));
        let result = registry().invoke(&call).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
        assert_eq!(
            result.error.unwrap().message,
            "OpenWeather API key not configured"
        );
    }
}
