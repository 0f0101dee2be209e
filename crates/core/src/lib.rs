//! Domain types for the storyforge generation pipeline.
//!
//! This crate holds the pure data model shared by every other workspace
//! member: the task lifecycle state machine, batch specifications and
//! derived batch status, orchestration tunables, and the core error
//! type. It has no internal dependencies and performs no I/O.

pub mod batch;
pub mod config;
pub mod error;
pub mod task;
pub mod types;

pub use batch::{derive_batch_status, BatchSpec, BatchStatus, TaskSeed};
pub use config::OrchestratorConfig;
pub use error::CoreError;
pub use task::{TaskKind, TaskOutput, TaskRecord, TaskStatus};
pub use types::{BatchId, TaskId, Timestamp};
