use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::Result;
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::str_arg;
use crate::catalog::Catalog;

pub struct SearchInventoryTool {
    catalog: Arc<Catalog>,
}

impl SearchInventoryTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for SearchInventoryTool {
    fn name(&self) -> &str {
        "search_inventory"
    }

    fn description(&self) -> &str {
        "Search the product inventory by name (case-insensitive substring). An empty name lists every product."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::optional(
            "product_name",
            ParamType::String,
            "Product name or fragment to search for",
            Some(json!("")),
        )]
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let query = str_arg(&args, "product_name")?;
            let items = self.catalog.search(query);

            let text = if items.is_empty() {
                format!("No products found matching '{}'.", query)
            } else {
                format!("Found {} items.", items.len())
            };

            Ok(json!({
                "type": "inventory_search",
                "items": items,
                "text": text,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> SearchInventoryTool {
        SearchInventoryTool::new(Arc::new(Catalog::seeded()))
    }

    #[tokio::test]
    async fn finds_matching_products() {
        let mut args = Map::new();
        args.insert("product_name".into(), json!("mouse"));
        let out = tool().execute(args).await.unwrap();
        assert_eq!(out["items"][0]["id"], "p3");
        assert_eq!(out["items"][0]["stock"], 0);
        assert_eq!(out["text"], "Found 1 items.");
    }

    #[tokio::test]
    async fn empty_query_lists_everything() {
        let mut args = Map::new();
        args.insert("product_name".into(), json!(""));
        let out = tool().execute(args).await.unwrap();
        assert_eq!(out["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn no_match_message() {
        let mut args = Map::new();
        args.insert("product_name".into(), json!("Desk"));
        let out = tool().execute(args).await.unwrap();
        assert!(out["items"].as_array().unwrap().is_empty());
        assert_eq!(out["text"], "No products found matching 'Desk'.");
    }
}
