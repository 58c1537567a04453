use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use secureorder_core::error::{Result, SecureOrderError};

/// One order record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub status: String,
    pub customer: String,
    pub eta: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// One inventory line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub stock: u32,
    pub price: String,
}

/// Read-only lookup table of orders and inventory shared by the catalog tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    orders: BTreeMap<String, Order>,
    #[serde(default)]
    inventory: Vec<Product>,
}

impl Catalog {
    pub fn new(orders: BTreeMap<String, Order>, inventory: Vec<Product>) -> Self {
        Self { orders, inventory }
    }

    /// The demo catalog: three orders and three products.
    pub fn seeded() -> Self {
        let order = |status: &str, customer: &str, eta: &str, item: &str| Order {
            status: status.into(),
            customer: customer.into(),
            eta: eta.into(),
            items: vec![item.into()],
        };
        let product = |id: &str, name: &str, stock: u32, price: &str| Product {
            id: id.into(),
            name: name.into(),
            stock,
            price: price.into(),
        };

        let mut orders = BTreeMap::new();
        orders.insert(
            "1001".to_string(),
            order("Shipped", "Alice", "2026-02-15", "Ultra-Wide Monitor"),
        );
        orders.insert(
            "1002".to_string(),
            order("Processing", "Bob", "2026-02-18", "Mechanical Keyboard"),
        );
        orders.insert(
            "1003".to_string(),
            order("Pending", "Charlie", "2026-02-20", "Wireless Mouse"),
        );

        Self {
            orders,
            inventory: vec![
                product("p1", "Ultra-Wide Monitor", 5, "$450"),
                product("p2", "Mechanical Keyboard", 12, "$120"),
                product("p3", "Wireless Mouse", 0, "$80"),
            ],
        }
    }

    /// Load a catalog from a JSON file with `orders` and `inventory` keys.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SecureOrderError::Config(format!("catalog {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SecureOrderError::Config(format!("catalog {}: {}", path.display(), e)))
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Case-insensitive substring match on product names. An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Product> {
        let needle = query.trim().to_lowercase();
        self.inventory
            .iter()
            .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn product_count(&self) -> usize {
        self.inventory.len()
    }
}
