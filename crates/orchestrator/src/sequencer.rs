//! Strictly sequential task admission for one batch.
//!
//! Several batch kinds feed a task's output into the next task's input
//! (the next composite's background is the prior clip's trailing
//! frame), so admission is strictly sequential rather than merely
//! rate-limited: at most one task per batch is ever in flight. The
//! sequencer owns the batch cursor, drives each admitted task through
//! submission (with bounded retries) and polling to a terminal status,
//! hands the outcome to [`PersistenceSync`], and then advances.
//!
//! Failures are isolated: a failed or timed-out task does not stop the
//! batch, except for downstream tasks that explicitly depend on it,
//! which are failed with a "missing dependency" reason instead of being
//! admitted with a stale input.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use storyforge_core::batch::{completion_summary, derive_batch_status, BatchStatus};
use storyforge_core::config::OrchestratorConfig;
use storyforge_core::task::{TaskKind, TaskStatus};
use storyforge_core::types::{BatchId, TaskId};
use storyforge_events::{EventBus, TaskEvent};
use storyforge_providers::JobClient;
use tokio_util::sync::CancellationToken;

use crate::poller::{PollResult, StatusPoller};
use crate::registry::TaskRegistry;
use crate::retry::{run_with_retry, RetryEvent, RetryOutcome, RetryPolicy};
use crate::sync::PersistenceSync;

// ---------------------------------------------------------------------------
// ClientSet
// ---------------------------------------------------------------------------

/// Job clients indexed by the task kind they handle.
#[derive(Default, Clone)]
pub struct ClientSet {
    clients: HashMap<TaskKind, Arc<dyn JobClient>>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under the kind it reports.
    pub fn insert(&mut self, client: Arc<dyn JobClient>) {
        self.clients.insert(client.kind(), client);
    }

    pub fn get(&self, kind: TaskKind) -> Option<&Arc<dyn JobClient>> {
        self.clients.get(&kind)
    }
}

// ---------------------------------------------------------------------------
// BatchState
// ---------------------------------------------------------------------------

/// Mutable batch bookkeeping shared between the sequencer and its
/// [`BatchHandle`](crate::manager::BatchHandle).
pub(crate) struct BatchState {
    /// Per-task statuses, kept even after records are evicted from the
    /// registry so batch summaries survive persistence.
    pub(crate) statuses: Vec<TaskStatus>,
    /// Index of the task currently admitted; `None` when idle or done.
    pub(crate) cursor: Option<usize>,
    /// Set by explicit user cancellation.
    pub(crate) cancelled: bool,
}

impl BatchState {
    pub(crate) fn new(task_count: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::Pending; task_count],
            cursor: None,
            cancelled: false,
        }
    }

    pub(crate) fn derived_status(&self) -> BatchStatus {
        derive_batch_status(&self.statuses, self.cancelled)
    }
}

// ---------------------------------------------------------------------------
// Dependency resolution
// ---------------------------------------------------------------------------

/// Check that a dependency reached `Succeeded` before admitting the
/// dependent task. Returns the failure reason otherwise.
fn resolve_dependency(
    dependency: TaskId,
    task_ids: &[TaskId],
    statuses: &[TaskStatus],
) -> Result<(), String> {
    let Some(index) = task_ids.iter().position(|id| *id == dependency) else {
        return Err(format!("missing dependency: task {dependency} is not part of this batch"));
    };
    match statuses[index] {
        TaskStatus::Succeeded => Ok(()),
        status => Err(format!(
            "missing dependency: task at index {index} ended {status}, no input available"
        )),
    }
}

// ---------------------------------------------------------------------------
// BatchSequencer
// ---------------------------------------------------------------------------

/// Outcome of driving one task to rest.
enum TaskRun {
    Terminal(TaskStatus),
    Cancelled,
}

/// Runs one batch's tasks strictly in sequence.
pub struct BatchSequencer {
    pub(crate) batch_id: BatchId,
    pub(crate) batch_ref: String,
    pub(crate) task_ids: Vec<TaskId>,
    pub(crate) clients: Arc<ClientSet>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) sync: PersistenceSync,
    pub(crate) config: OrchestratorConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<RwLock<BatchState>>,
}

impl BatchSequencer {
    /// Drive the batch to completion or cancellation.
    pub async fn run(self) {
        tracing::info!(
            batch_id = %self.batch_id,
            batch_ref = %self.batch_ref,
            task_count = self.task_ids.len(),
            "Batch started",
        );

        for index in 0..self.task_ids.len() {
            if self.cancel.is_cancelled() {
                break;
            }
            let task_id = self.task_ids[index];

            // Admission while another task is in flight would be a
            // sequencer bug, not a runtime condition.
            debug_assert_eq!(
                self.task_ids
                    .iter()
                    .filter_map(|id| self.registry.status(*id))
                    .filter(|s| s.is_in_flight())
                    .count(),
                0,
                "admitted task {index} while another task is in flight"
            );
            self.state.write().unwrap().cursor = Some(index);

            match self.run_task(index, task_id).await {
                TaskRun::Terminal(status) => {
                    self.state.write().unwrap().statuses[index] = status;
                    if let Err(e) = self
                        .sync
                        .finalize(self.batch_id, &self.batch_ref, task_id)
                        .await
                    {
                        tracing::error!(
                            batch_id = %self.batch_id,
                            %task_id,
                            error = %e,
                            "Failed to finalize task",
                        );
                    }
                }
                TaskRun::Cancelled => break,
            }
        }

        self.state.write().unwrap().cursor = None;
        self.finish();
    }

    // ---- private helpers ----

    /// Drive one admitted task through submission and polling.
    async fn run_task(&self, index: usize, task_id: TaskId) -> TaskRun {
        let Some(task) = self.registry.get(task_id) else {
            tracing::error!(%task_id, "Admitted task missing from registry");
            return TaskRun::Terminal(TaskStatus::Failed);
        };

        self.bus.publish(TaskEvent::TaskAdmitted {
            batch_id: self.batch_id,
            task_id,
            sequence_index: index,
        });

        // Resolve the explicit dependency link before anything is
        // submitted; a dependent task never runs against a stale input.
        if let Some(dependency) = task.depends_on {
            let dependency_check = {
                let state = self.state.read().unwrap();
                resolve_dependency(dependency, &self.task_ids, &state.statuses)
            };
            if let Err(reason) = dependency_check {
                return self.fail_before_submission(task_id, reason);
            }
        }

        let Some(client) = self.clients.get(task.kind) else {
            return self.fail_before_submission(
                task_id,
                format!("No job client configured for kind {}", task.kind),
            );
        };

        // Submission, with the retry governor driving the
        // Pending <-> Submitting bookkeeping on the record.
        let policy = RetryPolicy::from_config(&self.config);
        let max_retries = self.config.max_retries;
        let parameters = task.parameters.clone();
        let outcome = run_with_retry(
            task.kind.as_str(),
            &policy,
            &self.cancel,
            |event| match event {
                RetryEvent::AttemptStarted { .. } => {
                    if let Err(e) = self.registry.with_task_mut(task_id, |t| t.mark_submitting()) {
                        tracing::error!(%task_id, error = %e, "Submission bookkeeping failed");
                    }
                }
                RetryEvent::TransientFailure {
                    attempt,
                    error,
                    will_retry,
                } => {
                    let reason = error.to_string();
                    if let Err(e) = self
                        .registry
                        .with_task_mut(task_id, |t| t.submission_failed(max_retries, &reason))
                    {
                        tracing::error!(%task_id, error = %e, "Submission bookkeeping failed");
                    }
                    if will_retry {
                        self.bus.publish(TaskEvent::TaskRetrying {
                            batch_id: self.batch_id,
                            task_id,
                            attempt: attempt + 1,
                            max_attempts: policy.max_attempts,
                            message: policy.attempt_message(attempt + 1),
                        });
                    }
                }
            },
            || client.submit(&parameters),
        )
        .await;

        let external_job_id = match outcome {
            RetryOutcome::Ok { value, .. } => value,
            RetryOutcome::Permanent { error } => {
                let _ = self
                    .registry
                    .with_task_mut(task_id, |t| t.mark_failed(error.to_string()));
                return TaskRun::Terminal(TaskStatus::Failed);
            }
            // The final TransientFailure callback already moved the
            // record to Failed with a retry-exhaustion reason.
            RetryOutcome::Exhausted { .. } => return TaskRun::Terminal(TaskStatus::Failed),
            RetryOutcome::Cancelled => return TaskRun::Cancelled,
        };

        if let Err(e) = self
            .registry
            .with_task_mut(task_id, |t| t.mark_polling(external_job_id))
        {
            tracing::error!(%task_id, error = %e, "Polling bookkeeping failed");
            return TaskRun::Terminal(TaskStatus::Failed);
        }

        // Poll to a terminal status under a task-owned token. The token
        // is a child of the batch token, so batch cancellation tears
        // the poll loop down with it.
        let task_token = self.cancel.child_token();
        self.registry.register_token(task_id, task_token.clone());

        let poller = StatusPoller {
            client: client.as_ref(),
            registry: &self.registry,
            bus: &self.bus,
            batch_id: self.batch_id,
            interval: self.config.poll_interval,
            policy,
        };
        let result = poller
            .run(task_id, self.config.timeout_for(task.kind), &task_token)
            .await;
        self.registry.release_token(task_id);

        match result {
            Ok(PollResult::Terminal(status)) => TaskRun::Terminal(status),
            Ok(PollResult::Cancelled) => TaskRun::Cancelled,
            Err(e) => {
                tracing::error!(%task_id, error = %e, "Poll loop aborted");
                let _ = self
                    .registry
                    .with_task_mut(task_id, |t| t.mark_failed(format!("internal error: {e}")));
                TaskRun::Terminal(TaskStatus::Failed)
            }
        }
    }

    /// Fail a task that never reached submission.
    fn fail_before_submission(&self, task_id: TaskId, reason: String) -> TaskRun {
        tracing::warn!(%task_id, reason = %reason, "Task failed before submission");
        if let Err(e) = self.registry.with_task_mut(task_id, |t| t.mark_failed(reason)) {
            tracing::error!(%task_id, error = %e, "Failure bookkeeping failed");
        }
        TaskRun::Terminal(TaskStatus::Failed)
    }

    /// Publish the batch's settled status and summary.
    fn finish(&self) {
        let (status, summary) = {
            let state = self.state.read().unwrap();
            (state.derived_status(), completion_summary(&state.statuses))
        };
        tracing::info!(
            batch_id = %self.batch_id,
            batch_ref = %self.batch_ref,
            status = status.as_str(),
            %summary,
            "Batch finished",
        );
        self.bus.publish(TaskEvent::BatchFinished {
            batch_id: self.batch_id,
            status,
            summary,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
