//! Reconciliation of terminal task outcomes into durable storage.
//!
//! Once a task settles, [`PersistenceSync::finalize`] is the single
//! path that announces the outcome, writes the durable record (for
//! successes), and evicts the task from transient tracking. Finalizing
//! an already-finalized task is a no-op, so duplicate terminal
//! notifications are harmless.

use std::sync::Arc;

use storyforge_core::error::CoreError;
use storyforge_core::task::TaskStatus;
use storyforge_core::types::{BatchId, TaskId};
use storyforge_events::{EventBus, TaskEvent};
use storyforge_store::{GenerationRecord, ResultStore};

use crate::error::OrchestratorError;
use crate::registry::TaskRegistry;

/// Commits terminal outcomes to the [`ResultStore`] exactly once.
pub struct PersistenceSync {
    store: Arc<dyn ResultStore>,
    registry: Arc<TaskRegistry>,
    bus: Arc<EventBus>,
}

impl PersistenceSync {
    pub fn new(
        store: Arc<dyn ResultStore>,
        registry: Arc<TaskRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            registry,
            bus,
        }
    }

    /// Finalize a terminal task: publish its terminal event, persist a
    /// durable record when it succeeded, and evict it from the
    /// registry (record and token both).
    ///
    /// Returns the finalized status, or `None` when the task was
    /// already finalized by an earlier call. Failures and timeouts are
    /// evicted without a durable record -- a batch that succeeds K of N
    /// times leaves exactly K records.
    pub async fn finalize(
        &self,
        batch_id: BatchId,
        batch_ref: &str,
        task_id: TaskId,
    ) -> Result<Option<TaskStatus>, OrchestratorError> {
        let task = match self.registry.get(task_id) {
            Some(task) => task,
            // Already finalized; duplicate notifications are expected.
            None => return Ok(None),
        };

        if !task.status.is_terminal() {
            return Err(OrchestratorError::Core(CoreError::Internal(format!(
                "Cannot finalize task {task_id} in non-terminal status {}",
                task.status
            ))));
        }

        self.bus.publish(TaskEvent::TaskTerminal {
            batch_id,
            task_id,
            status: task.status,
            output: task.output.clone(),
            error: task.error.clone(),
        });

        if task.status == TaskStatus::Succeeded {
            let output = task.output.clone().ok_or_else(|| {
                CoreError::Internal(format!("Succeeded task {task_id} carries no output"))
            })?;
            let record = GenerationRecord::new(
                task.id,
                batch_ref,
                task.kind,
                task.sequence_index,
                output,
            );
            self.store.create_record(&record).await?;
            tracing::info!(
                %task_id,
                batch_ref,
                sequence_index = task.sequence_index,
                "Result persisted",
            );
        } else {
            tracing::info!(
                %task_id,
                batch_ref,
                status = %task.status,
                error = task.error.as_deref().unwrap_or(""),
                "Task settled without result",
            );
        }

        self.registry.evict(task_id);
        Ok(Some(task.status))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
