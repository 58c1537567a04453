//! Step-graph execution engine.
//!
//! A run walks Researcher → (ToolExecution → Researcher)* → Analyzer. The
//! session is checkpointed after every step, and with approval enabled the
//! run halts between a tool request and its execution until `resume`.

pub mod engine;

pub use engine::GraphEngine;
