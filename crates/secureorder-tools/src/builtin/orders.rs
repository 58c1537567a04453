use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::Result;
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::str_arg;
use crate::catalog::Catalog;

/// Risk added when an order contains high-value electronics.
const MONITOR_RISK: u32 = 40;
/// Risk added while an order is still unverified.
const PENDING_RISK: u32 = 30;
const REVIEW_THRESHOLD: u32 = 50;

fn order_id_param() -> Vec<ParamSpec> {
    vec![ParamSpec::required(
        "order_id",
        ParamType::String,
        "The order identifier, e.g. \"1001\"",
    )]
}

pub struct FetchOrderStatusTool {
    catalog: Arc<Catalog>,
}

impl FetchOrderStatusTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for FetchOrderStatusTool {
    fn name(&self) -> &str {
        "fetch_order_status"
    }

    fn description(&self) -> &str {
        "Return structured order info (status, customer, ETA, items) for a given order ID."
    }

    fn params(&self) -> Vec<ParamSpec> {
        order_id_param()
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let order_id = str_arg(&args, "order_id")?;
            let Some(order) = self.catalog.order(order_id) else {
                return Ok(json!({
                    "type": "error",
                    "message": format!("Order ID {} not found", order_id),
                }));
            };

            Ok(json!({
                "type": "order",
                "order": {
                    "order_id": order_id,
                    "status": order.status,
                    "customer": order.customer,
                    "eta": order.eta,
                    "items": order.items,
                },
                "text": format!(
                    "Order {}: Status is '{}', ETA is {}. Items: {}.",
                    order_id,
                    order.status,
                    order.eta,
                    order.items.join(", ")
                ),
            }))
        })
    }
}

pub struct AuditOrderSecurityTool {
    catalog: Arc<Catalog>,
}

impl AuditOrderSecurityTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for AuditOrderSecurityTool {
    fn name(&self) -> &str {
        "audit_order_security"
    }

    fn description(&self) -> &str {
        "Run a security audit on an order and return its risk score and findings."
    }

    fn params(&self) -> Vec<ParamSpec> {
        order_id_param()
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let order_id = str_arg(&args, "order_id")?;
            let Some(order) = self.catalog.order(order_id) else {
                return Ok(json!({
                    "type": "security_audit",
                    "order_id": order_id,
                    "status": "not_found",
                    "risk_score": null,
                    "findings": [],
                }));
            };

            let mut risk_score = 0;
            let mut findings = Vec::new();
            if order.items.iter().any(|item| item.contains("Monitor")) {
                risk_score += MONITOR_RISK;
                findings.push("High-value electronics detected");
            }
            if order.status == "Pending" {
                risk_score += PENDING_RISK;
                findings.push("Order is in unverified 'Pending' state");
            }

            let status = if risk_score < REVIEW_THRESHOLD {
                "SECURE"
            } else {
                "WARNING: REQUIRES REVIEW"
            };

            Ok(json!({
                "type": "security_audit",
                "order_id": order_id,
                "status": status,
                "risk_score": risk_score,
                "findings": findings,
                "text": format!("Audit {}: {} (score={})", order_id, status, risk_score),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Order, Product};
    use std::collections::BTreeMap;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn fetch_known_order() {
        let tool = FetchOrderStatusTool::new(Arc::new(Catalog::seeded()));
        let out = tool.execute(args(json!({ "order_id": "1001" }))).await.unwrap();
        assert_eq!(out["type"], "order");
        assert_eq!(out["order"]["status"], "Shipped");
        assert_eq!(out["order"]["customer"], "Alice");
        assert_eq!(
            out["text"],
            "Order 1001: Status is 'Shipped', ETA is 2026-02-15. Items: Ultra-Wide Monitor."
        );
    }

    #[tokio::test]
    async fn fetch_unknown_order() {
        let tool = FetchOrderStatusTool::new(Arc::new(Catalog::seeded()));
        let out = tool.execute(args(json!({ "order_id": "42" }))).await.unwrap();
        assert_eq!(out["type"], "error");
        assert_eq!(out["message"], "Order ID 42 not found");
    }

    #[tokio::test]
    async fn audit_scores() {
        let tool = AuditOrderSecurityTool::new(Arc::new(Catalog::seeded()));

        let out = tool.execute(args(json!({ "order_id": "1001" }))).await.unwrap();
        assert_eq!(out["risk_score"], 40);
        assert_eq!(out["status"], "SECURE");

        let out = tool.execute(args(json!({ "order_id": "1003" }))).await.unwrap();
        assert_eq!(out["risk_score"], 30);
        assert_eq!(out["status"], "SECURE");

        let out = tool.execute(args(json!({ "order_id": "nope" }))).await.unwrap();
        assert_eq!(out["status"], "not_found");
        assert!(out["risk_score"].is_null());
    }

    #[tokio::test]
    async fn audit_flags_pending_monitor_orders() {
        let mut orders = BTreeMap::new();
        orders.insert(
            "9".to_string(),
            Order {
                status: "Pending".into(),
                customer: "Eve".into(),
                eta: "2026-04-01".into(),
                items: vec!["Curved Monitor".into()],
            },
        );
        let catalog = Catalog::new(orders, Vec::<Product>::new());
        let tool = AuditOrderSecurityTool::new(Arc::new(catalog));

        let out = tool.execute(args(json!({ "order_id": "9" }))).await.unwrap();
        assert_eq!(out["risk_score"], 70);
        assert_eq!(out["status"], "WARNING: REQUIRES REVIEW");
        assert_eq!(out["findings"].as_array().unwrap().len(), 2);
    }
}
