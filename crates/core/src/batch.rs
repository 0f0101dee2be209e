//! Batch specifications and derived batch status.
//!
//! A batch is an ordered group of tasks created by one user action
//! ("generate 8 comic panels"). Admission order and the single
//! in-flight cursor live in the orchestrator's sequencer; this module
//! holds the pure pieces: the batch description, validation, and the
//! status/summary derivations.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::task::{TaskKind, TaskStatus};

/// Hard ceiling on tasks per batch to prevent runaway requests.
pub const MAX_TASKS_PER_BATCH: usize = 100;

// ---------------------------------------------------------------------------
// BatchSpec
// ---------------------------------------------------------------------------

/// Description of one task within a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSeed {
    /// Which provider endpoint the task targets.
    pub kind: TaskKind,
    /// Provider-specific parameters, passed through verbatim.
    pub parameters: serde_json::Value,
    /// Whether this task consumes the previous task's output as an
    /// input (e.g. a panel whose reference image is the prior panel's
    /// trailing frame). Resolved to an explicit task-id link when the
    /// batch is constructed.
    #[serde(default)]
    pub depends_on_previous: bool,
}

/// An ordered batch request as issued by one user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSpec {
    pub tasks: Vec<TaskSeed>,
}

impl BatchSpec {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Validate a batch specification before any task is created.
///
/// Rules:
/// - Must contain at least one task.
/// - Must not exceed [`MAX_TASKS_PER_BATCH`] tasks.
/// - The first task cannot depend on a previous task.
pub fn validate_batch_spec(spec: &BatchSpec) -> Result<(), CoreError> {
    if spec.tasks.is_empty() {
        return Err(CoreError::Validation(
            "Batch must contain at least one task".to_string(),
        ));
    }
    if spec.tasks.len() > MAX_TASKS_PER_BATCH {
        return Err(CoreError::Validation(format!(
            "Batch must not exceed {MAX_TASKS_PER_BATCH} tasks"
        )));
    }
    if spec.tasks[0].depends_on_previous {
        return Err(CoreError::Validation(
            "First task in a batch cannot depend on a previous task".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BatchStatus
// ---------------------------------------------------------------------------

/// Derived status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one task is still pending or in flight.
    Running,
    /// Every task has reached a terminal status.
    Completed,
    /// The user stopped the batch; un-admitted tasks stay pending forever.
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

/// Derive a batch's status from its tasks' statuses.
///
/// An explicit cancellation takes precedence over everything else:
/// a cancelled batch stays `Cancelled` even though its remaining tasks
/// are still `Pending`.
pub fn derive_batch_status(statuses: &[TaskStatus], cancelled: bool) -> BatchStatus {
    if cancelled {
        return BatchStatus::Cancelled;
    }
    if statuses.iter().all(|s| s.is_terminal()) {
        BatchStatus::Completed
    } else {
        BatchStatus::Running
    }
}

// ---------------------------------------------------------------------------
// Completion summary
// ---------------------------------------------------------------------------

/// Count tasks that reached `Succeeded`.
pub fn count_succeeded(statuses: &[TaskStatus]) -> usize {
    statuses
        .iter()
        .filter(|s| **s == TaskStatus::Succeeded)
        .count()
}

/// Human-readable partial-completion summary, e.g. `"3 of 5 succeeded"`.
///
/// Partial completion is a normal outcome, not an exceptional one; this
/// string is what observers surface to the user.
pub fn completion_summary(statuses: &[TaskStatus]) -> String {
    format!(
        "{} of {} succeeded",
        count_succeeded(statuses),
        statuses.len()
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(kind: TaskKind) -> TaskSeed {
        TaskSeed {
            kind,
            parameters: serde_json::json!({}),
            depends_on_previous: false,
        }
    }

    // -- validate_batch_spec --

    #[test]
    fn empty_batch_rejected() {
        let spec = BatchSpec { tasks: vec![] };
        assert!(validate_batch_spec(&spec).is_err());
    }

    #[test]
    fn oversized_batch_rejected() {
        let spec = BatchSpec {
            tasks: (0..MAX_TASKS_PER_BATCH + 1)
                .map(|_| seed(TaskKind::Image))
                .collect(),
        };
        assert!(validate_batch_spec(&spec).is_err());
    }

    #[test]
    fn first_task_with_dependency_rejected() {
        let mut first = seed(TaskKind::Video);
        first.depends_on_previous = true;
        let spec = BatchSpec { tasks: vec![first] };
        assert!(validate_batch_spec(&spec).is_err());
    }

    #[test]
    fn chained_batch_accepted() {
        let mut second = seed(TaskKind::Video);
        second.depends_on_previous = true;
        let spec = BatchSpec {
            tasks: vec![seed(TaskKind::Video), second],
        };
        assert!(validate_batch_spec(&spec).is_ok());
    }

    // -- derive_batch_status --

    #[test]
    fn batch_running_while_any_task_open() {
        let statuses = [TaskStatus::Succeeded, TaskStatus::Polling, TaskStatus::Pending];
        assert_eq!(derive_batch_status(&statuses, false), BatchStatus::Running);
    }

    #[test]
    fn batch_completed_when_all_terminal() {
        let statuses = [
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::TimedOut,
        ];
        assert_eq!(
            derive_batch_status(&statuses, false),
            BatchStatus::Completed
        );
    }

    #[test]
    fn cancellation_wins_over_pending_tasks() {
        let statuses = [TaskStatus::Succeeded, TaskStatus::Pending];
        assert_eq!(derive_batch_status(&statuses, true), BatchStatus::Cancelled);
    }

    // -- Summary --

    #[test]
    fn summary_counts_only_successes() {
        let statuses = [
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Succeeded,
            TaskStatus::TimedOut,
            TaskStatus::Pending,
        ];
        assert_eq!(completion_summary(&statuses), "2 of 5 succeeded");
    }
}
