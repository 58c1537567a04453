pub mod checkpoint;
pub mod graph;
pub mod router;
pub mod session;
pub mod steps;

pub use checkpoint::{open_store, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use graph::GraphEngine;
pub use session::{SessionGuard, SessionLocks};
