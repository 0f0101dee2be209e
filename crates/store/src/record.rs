//! The minimal durable record of one successful generation.

use serde::{Deserialize, Serialize};
use storyforge_core::task::{TaskKind, TaskOutput};
use storyforge_core::types::{TaskId, Timestamp};

/// One persisted generation result.
///
/// Deliberately minimal: just enough to restore a batch's completed
/// work after a restart. Application-level bookkeeping (owning entity,
/// credits, review state) lives with the application, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// The task this record captures. Also the idempotency key.
    pub task_id: TaskId,
    /// Application-defined batch context, e.g. `"project-7/panels"`.
    pub batch_ref: String,
    /// Job kind that produced the output.
    pub kind: TaskKind,
    /// Position within the owning batch.
    pub sequence_index: usize,
    /// The successful result payload.
    pub output: TaskOutput,
    /// When the record was first persisted.
    pub created_at: Timestamp,
}

impl GenerationRecord {
    pub fn new(
        task_id: TaskId,
        batch_ref: impl Into<String>,
        kind: TaskKind,
        sequence_index: usize,
        output: TaskOutput,
    ) -> Self {
        Self {
            task_id,
            batch_ref: batch_ref.into(),
            kind,
            sequence_index,
            output,
            created_at: chrono::Utc::now(),
        }
    }
}
