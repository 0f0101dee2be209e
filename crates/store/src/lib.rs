//! Durable storage collaborator for terminal generation results.
//!
//! The orchestrator only talks to storage through the [`ResultStore`]
//! trait, and only after a task has reached a terminal state. Two
//! implementations are provided: [`MemoryStore`] for tests and
//! single-process runs, and [`PgResultStore`] backed by Postgres.

pub mod memory;
pub mod postgres;
pub mod record;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use postgres::{create_pool, PgResultStore};
pub use record::GenerationRecord;

use storyforge_core::task::TaskOutput;
use storyforge_core::types::TaskId;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the given id.
    #[error("Record not found: {0}")]
    NotFound(TaskId),

    /// The underlying database rejected the operation.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded back into a record.
    #[error("Corrupt stored record: {0}")]
    Corrupt(String),
}

/// Durable storage for successful generation results.
///
/// `create_record` is keyed by task id and must be idempotent: writing
/// the same task's outcome twice repeats the same value rather than
/// producing a duplicate. Failures are never stored -- a batch that
/// succeeds K of N times leaves exactly K records.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one terminal success. Idempotent per task id.
    async fn create_record(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    /// Replace the stored output of an existing record (e.g. after the
    /// user regenerates a single item in place).
    async fn update_record(&self, task_id: TaskId, output: &TaskOutput) -> Result<(), StoreError>;

    /// Remove a record the user explicitly discarded.
    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError>;

    /// Load all records for a batch context, ordered by sequence index.
    /// Used to restore completed work after a restart without
    /// re-invoking generation.
    async fn list_by_batch(&self, batch_ref: &str) -> Result<Vec<GenerationRecord>, StoreError>;
}
