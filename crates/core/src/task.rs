//! Task lifecycle state machine for asynchronous generation work.
//!
//! A [`TaskRecord`] tracks one submitted unit of generation work from
//! `Pending` through to a terminal outcome. All mutation goes through
//! the transition methods below; each one rejects illegal transitions
//! with [`CoreError::InvalidTransition`], so a record that has reached
//! a terminal status can never be modified again.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// The kind of generation job a task represents.
///
/// Each kind maps to a dedicated provider endpoint; all four share the
/// same submit-then-poll lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Image,
    Video,
    Text,
    Speech,
}

impl TaskKind {
    /// String representation used in logs and stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
            TaskKind::Text => "text",
            TaskKind::Speech => "speech",
        }
    }

    /// Parse from a stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(TaskKind::Image),
            "video" => Some(TaskKind::Video),
            "text" => Some(TaskKind::Text),
            "speech" => Some(TaskKind::Speech),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
///
/// `Pending -> Submitting -> Polling -> {Succeeded | Failed | TimedOut}`.
/// A submission error sends the task back to `Pending` while retry
/// budget remains. The three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl TaskStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    /// Whether the task currently occupies its batch's in-flight slot.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskStatus::Submitting | TaskStatus::Polling)
    }

    /// String representation used in logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Submitting => "submitting",
            TaskStatus::Polling => "polling",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskOutput
// ---------------------------------------------------------------------------

/// Successful result payload of a generation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TaskOutput {
    /// A URL pointing at a generated asset (image, video, audio file).
    Url(String),
    /// An inline text blob (chapter text, script fragment).
    Text(String),
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// The unit of state tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Locally generated identifier, stable for the lifetime of the run.
    pub id: TaskId,
    /// Which provider endpoint this task targets.
    pub kind: TaskKind,
    /// Provider-specific generation parameters, passed through verbatim.
    pub parameters: serde_json::Value,
    /// Identifier returned by the remote service; `None` before submission.
    pub external_job_id: Option<String>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Remote-reported completion fraction in `[0, 1]`. Meaningless
    /// while `Pending`; monotonically non-decreasing while `Polling`.
    pub progress: f64,
    /// Success payload; present only when `Succeeded`.
    pub output: Option<TaskOutput>,
    /// Human-readable failure reason; present only when `Failed` or
    /// `TimedOut`.
    pub error: Option<String>,
    /// Number of resubmissions already attempted.
    pub retry_count: u32,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the most recent successful submission happened. The timeout
    /// clock runs from here.
    pub submitted_at: Option<Timestamp>,
    /// Position within the owning batch.
    pub sequence_index: usize,
    /// Task whose output this task consumes as an input, if any.
    pub depends_on: Option<TaskId>,
}

impl TaskRecord {
    /// Create a new `Pending` record.
    pub fn new(kind: TaskKind, parameters: serde_json::Value, sequence_index: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            parameters,
            external_job_id: None,
            status: TaskStatus::Pending,
            progress: 0.0,
            output: None,
            error: None,
            retry_count: 0,
            created_at: Utc::now(),
            submitted_at: None,
            sequence_index,
            depends_on: None,
        }
    }

    /// Attach an explicit dependency on an earlier task's output.
    pub fn with_dependency(mut self, dependency: TaskId) -> Self {
        self.depends_on = Some(dependency);
        self
    }

    /// Admit the task: `Pending -> Submitting`.
    pub fn mark_submitting(&mut self) -> Result<(), CoreError> {
        self.transition(TaskStatus::Pending, TaskStatus::Submitting)
    }

    /// Record a failed submission attempt: `Submitting -> Pending` while
    /// retry budget remains, `Submitting -> Failed` once `max_retries`
    /// resubmissions have already been spent.
    ///
    /// Returns the status the task ended up in.
    pub fn submission_failed(
        &mut self,
        max_retries: u32,
        reason: &str,
    ) -> Result<TaskStatus, CoreError> {
        if self.status != TaskStatus::Submitting {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Pending,
            });
        }
        if self.retry_count < max_retries {
            self.retry_count += 1;
            self.status = TaskStatus::Pending;
        } else {
            self.status = TaskStatus::Failed;
            self.error = Some(format!(
                "Submission retries exhausted after {} attempts: {reason}",
                self.retry_count + 1
            ));
        }
        Ok(self.status)
    }

    /// Record a successful submission: `Submitting -> Polling`.
    ///
    /// Captures the remote job id and starts the timeout clock.
    pub fn mark_polling(&mut self, external_job_id: impl Into<String>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Submitting, TaskStatus::Polling)?;
        self.external_job_id = Some(external_job_id.into());
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    /// Record remote-reported progress while `Polling`.
    ///
    /// The value is clamped to `[0, 1]` and never decreases.
    pub fn record_progress(&mut self, progress: f64) -> Result<(), CoreError> {
        if self.status != TaskStatus::Polling {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Polling,
            });
        }
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        Ok(())
    }

    /// Terminal success: `Polling -> Succeeded`, capturing the output.
    pub fn mark_succeeded(&mut self, output: TaskOutput) -> Result<(), CoreError> {
        self.transition(TaskStatus::Polling, TaskStatus::Succeeded)?;
        self.progress = 1.0;
        self.output = Some(output);
        Ok(())
    }

    /// Terminal failure from any non-terminal status.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.status = TaskStatus::Failed;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Deadline exceeded while `Polling`: `Polling -> TimedOut`.
    ///
    /// Distinct from `Failed` so observers can tell the two apart, but
    /// treated as a failure for sequencing purposes.
    pub fn mark_timed_out(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Polling, TaskStatus::TimedOut)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Elapsed time since the most recent successful submission.
    pub fn elapsed_since_submission(&self, now: Timestamp) -> Option<chrono::Duration> {
        self.submitted_at.map(|t| now - t)
    }

    // ---- private helpers ----

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> Result<(), CoreError> {
        if self.status != from {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskKind::Image, serde_json::json!({"prompt": "castle"}), 0)
    }

    // -- Happy path --

    #[test]
    fn full_lifecycle_to_success() {
        let mut task = record();
        assert_eq!(task.status, TaskStatus::Pending);

        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();
        assert_eq!(task.external_job_id.as_deref(), Some("job-1"));
        assert!(task.submitted_at.is_some());

        task.record_progress(0.5).unwrap();
        task.mark_succeeded(TaskOutput::Url("https://cdn/img.png".into()))
            .unwrap();

        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.progress, 1.0);
        assert!(task.output.is_some());
        assert!(task.error.is_none());
    }

    // -- Terminal monotonicity --

    #[test]
    fn terminal_records_reject_all_mutation() {
        let mut task = record();
        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();
        task.mark_succeeded(TaskOutput::Text("done".into())).unwrap();

        assert_matches!(
            task.mark_failed("late failure"),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_matches!(
            task.record_progress(0.1),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_matches!(
            task.mark_submitting(),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_eq!(task.status, TaskStatus::Succeeded);
    }

    #[test]
    fn timed_out_is_terminal() {
        let mut task = record();
        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();
        task.mark_timed_out("deadline of 50s exceeded").unwrap();

        assert_eq!(task.status, TaskStatus::TimedOut);
        assert_matches!(
            task.mark_succeeded(TaskOutput::Text("too late".into())),
            Err(CoreError::InvalidTransition { .. })
        );
    }

    // -- Submission retry bookkeeping --

    #[test]
    fn submission_failure_returns_to_pending_with_budget() {
        let mut task = record();
        task.mark_submitting().unwrap();
        let status = task.submission_failed(10, "connection refused").unwrap();

        assert_eq!(status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.error.is_none());
    }

    #[test]
    fn submission_failure_exhausts_budget() {
        let mut task = record();
        for _ in 0..10 {
            task.mark_submitting().unwrap();
            assert_eq!(
                task.submission_failed(10, "connection refused").unwrap(),
                TaskStatus::Pending
            );
        }
        assert_eq!(task.retry_count, 10);

        // The 11th transient failure must fail the task, not re-enter Pending.
        task.mark_submitting().unwrap();
        let status = task.submission_failed(10, "connection refused").unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 10);
        assert!(task.error.as_deref().unwrap().contains("exhausted"));
    }

    #[test]
    fn submission_failure_requires_submitting() {
        let mut task = record();
        assert_matches!(
            task.submission_failed(10, "oops"),
            Err(CoreError::InvalidTransition { .. })
        );
    }

    // -- Progress --

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut task = record();
        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();

        task.record_progress(0.4).unwrap();
        task.record_progress(0.2).unwrap();
        assert_eq!(task.progress, 0.4);

        task.record_progress(7.0).unwrap();
        assert_eq!(task.progress, 1.0);
    }

    #[test]
    fn progress_rejected_while_pending() {
        let mut task = record();
        assert_matches!(
            task.record_progress(0.5),
            Err(CoreError::InvalidTransition { .. })
        );
    }

    // -- Output/error exclusivity --

    #[test]
    fn failed_task_has_error_but_no_output() {
        let mut task = record();
        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();
        task.mark_failed("content rejected by provider").unwrap();

        assert!(task.output.is_none());
        assert_eq!(
            task.error.as_deref(),
            Some("content rejected by provider")
        );
    }

    // -- Kind round-trip --

    #[test]
    fn kind_string_round_trip() {
        for kind in [
            TaskKind::Image,
            TaskKind::Video,
            TaskKind::Text,
            TaskKind::Speech,
        ] {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::parse("hologram"), None);
    }
}
