//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`TaskEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the orchestrator
//! and any number of observers.

use serde::{Deserialize, Serialize};
use storyforge_core::batch::BatchStatus;
use storyforge_core::task::{TaskOutput, TaskStatus};
use storyforge_core::types::{BatchId, TaskId};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// A lifecycle event emitted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The sequencer admitted a task into its batch's in-flight slot.
    TaskAdmitted {
        batch_id: BatchId,
        task_id: TaskId,
        sequence_index: usize,
    },

    /// Remote-reported progress for an in-flight task.
    TaskProgress {
        batch_id: BatchId,
        task_id: TaskId,
        /// Completion fraction in `[0, 1]`.
        progress: f64,
    },

    /// A transient error is being retried.
    TaskRetrying {
        batch_id: BatchId,
        task_id: TaskId,
        /// 1-based attempt about to be made.
        attempt: u32,
        /// Total attempts the retry budget allows.
        max_attempts: u32,
        /// Human-readable progress string, e.g. `"retrying, attempt 3/11"`.
        message: String,
    },

    /// A task reached a terminal status.
    TaskTerminal {
        batch_id: BatchId,
        task_id: TaskId,
        status: TaskStatus,
        /// Success payload; present only when `status` is `Succeeded`.
        output: Option<TaskOutput>,
        /// Failure reason; present when `status` is `Failed` or `TimedOut`.
        error: Option<String>,
    },

    /// The batch's derived status changed to a settled value.
    BatchFinished {
        batch_id: BatchId,
        status: BatchStatus,
        /// Partial-completion summary, e.g. `"3 of 5 succeeded"`.
        summary: String,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`TaskEvent`].
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the orchestrator's own bookkeeping never depends on delivery.
    pub fn publish(&self, event: TaskEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
