//! Shared task registry.
//!
//! [`TaskRegistry`] is the map of task id → [`TaskRecord`] plus the
//! per-task cancellation tokens that stand in for "this task's timers".
//! A token is registered when a task's poll loop starts and released on
//! the task's terminal transition or batch cancellation -- never left
//! behind, so no timer can outlive its task and mutate a record that
//! persistence has already archived.
//!
//! Lock discipline: at most one component owns a task's state
//! transition at a time (the sequencer runs tasks strictly one after
//! another), so the locks only guard map-level consistency. Critical
//! sections are short and never held across `.await`.

use std::collections::HashMap;
use std::sync::RwLock;

use storyforge_core::error::CoreError;
use storyforge_core::task::{TaskRecord, TaskStatus};
use storyforge_core::types::TaskId;
use tokio_util::sync::CancellationToken;

/// In-memory map of live tasks and their owned cancellation tokens.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    tokens: RwLock<HashMap<TaskId, CancellationToken>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record.
    pub fn insert(&self, record: TaskRecord) {
        self.tasks.write().unwrap().insert(record.id, record);
    }

    /// Snapshot one record.
    pub fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.read().unwrap().get(&task_id).cloned()
    }

    /// Current status of one task, if it is still tracked.
    pub fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.tasks.read().unwrap().get(&task_id).map(|t| t.status)
    }

    /// Apply a state-machine mutator to one record.
    pub fn with_task_mut<T>(
        &self,
        task_id: TaskId,
        f: impl FnOnce(&mut TaskRecord) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks.get_mut(&task_id).ok_or(CoreError::TaskNotFound(task_id))?;
        f(task)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().unwrap().is_empty()
    }

    // ---- token bookkeeping ----

    /// Register the cancellation token owning a task's poll loop.
    pub fn register_token(&self, task_id: TaskId, token: CancellationToken) {
        self.tokens.write().unwrap().insert(task_id, token);
    }

    /// Release (and return) a task's token without cancelling it.
    pub fn release_token(&self, task_id: TaskId) -> Option<CancellationToken> {
        self.tokens.write().unwrap().remove(&task_id)
    }

    /// Cancel a task's poll loop, if one is running. Safe to call for
    /// tasks that have no registered token.
    pub fn cancel_task(&self, task_id: TaskId) {
        if let Some(token) = self.tokens.read().unwrap().get(&task_id) {
            token.cancel();
        }
    }

    /// Number of live tokens. Zero once all tasks have settled; a
    /// non-zero value after a batch finished is a leaked timer.
    pub fn active_tokens(&self) -> usize {
        self.tokens.read().unwrap().len()
    }

    /// Drop a task from transient tracking: record and token both.
    pub fn evict(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tokens.write().unwrap().remove(&task_id);
        self.tasks.write().unwrap().remove(&task_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
