pub mod builtin;
pub mod catalog;
pub mod registry;
pub mod schema;

pub use catalog::Catalog;
pub use registry::ToolRegistry;
