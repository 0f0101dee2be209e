//! Fixed-cadence status polling for one in-flight task.
//!
//! The remote services expose pull-based status only, so each task in
//! `Polling` gets one owned loop: started once after a successful
//! submission, torn down exactly once on terminal transition or
//! cancellation. The loop owns the timeout clock -- the deadline is a
//! hard wall-clock limit enforced with `sleep_until`, independent of
//! the polling cadence, so a task crosses into `TimedOut` within one
//! interval of its deadline even if the provider never answers.

use std::time::Duration;

use storyforge_core::error::CoreError;
use storyforge_core::task::TaskStatus;
use storyforge_core::types::{BatchId, TaskId};
use storyforge_events::{EventBus, TaskEvent};
use storyforge_providers::{JobClient, RemoteStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::registry::TaskRegistry;
use crate::retry::{RetryBudget, RetryDecision, RetryPolicy};

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The task reached the given terminal status.
    Terminal(TaskStatus),
    /// The loop was cancelled; the task record is left non-terminal.
    Cancelled,
}

/// Poll loop collaborators, shared across the tasks of one batch.
pub struct StatusPoller<'a> {
    pub client: &'a dyn JobClient,
    pub registry: &'a TaskRegistry,
    pub bus: &'a EventBus,
    pub batch_id: BatchId,
    pub interval: Duration,
    pub policy: RetryPolicy,
}

impl StatusPoller<'_> {
    /// Poll `task_id` until it reaches a terminal status, the deadline
    /// passes, or `cancel` fires.
    ///
    /// The task must already be in `Polling` with a known external job
    /// id. Transient poll errors consume a bounded retry budget; a
    /// permanent error fails the task immediately.
    pub async fn run(
        &self,
        task_id: TaskId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PollResult, CoreError> {
        let task = self
            .registry
            .get(task_id)
            .ok_or(CoreError::TaskNotFound(task_id))?;
        let external_job_id = task.external_job_id.clone().ok_or_else(|| {
            CoreError::Internal(format!("Task {task_id} entered polling without a job id"))
        })?;

        let deadline = Instant::now() + timeout;
        let mut next_poll = Instant::now();
        let mut budget = RetryBudget::new(&self.policy);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(%task_id, "Poll loop cancelled");
                    return Ok(PollResult::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return self.timed_out(task_id, timeout, &task.kind.to_string());
                }
                _ = tokio::time::sleep_until(next_poll) => {}
            }
            next_poll += self.interval;

            // The deadline also bounds a poll call that hangs mid-flight.
            let response = match tokio::time::timeout_at(deadline, self.client.poll(&external_job_id)).await {
                Err(_) => return self.timed_out(task_id, timeout, &task.kind.to_string()),
                Ok(response) => response,
            };

            match response {
                Ok(poll) => match poll.status {
                    RemoteStatus::Queued | RemoteStatus::Running => {
                        if let Some(progress) = poll.progress {
                            let progress = self.registry.with_task_mut(task_id, |t| {
                                t.record_progress(progress)?;
                                Ok(t.progress)
                            })?;
                            self.bus.publish(TaskEvent::TaskProgress {
                                batch_id: self.batch_id,
                                task_id,
                                progress,
                            });
                        }
                    }
                    RemoteStatus::Succeeded => match poll.output {
                        Some(output) => {
                            self.registry
                                .with_task_mut(task_id, |t| t.mark_succeeded(output))?;
                            return Ok(PollResult::Terminal(TaskStatus::Succeeded));
                        }
                        // Success reported before the result materialized;
                        // treat like a transient fault and poll again.
                        None => {
                            if let Some(result) = self.transient_failure(task_id, &mut budget)? {
                                return Ok(result);
                            }
                        }
                    },
                    RemoteStatus::Failed => {
                        let reason = poll
                            .error
                            .unwrap_or_else(|| "Provider reported failure".to_string());
                        self.registry
                            .with_task_mut(task_id, |t| t.mark_failed(reason))?;
                        return Ok(PollResult::Terminal(TaskStatus::Failed));
                    }
                },
                Err(e) if e.is_transient() => {
                    tracing::warn!(%task_id, error = %e, "Transient poll error");
                    if let Some(result) = self.transient_failure(task_id, &mut budget)? {
                        return Ok(result);
                    }
                }
                Err(e) => {
                    self.registry
                        .with_task_mut(task_id, |t| t.mark_failed(e.to_string()))?;
                    return Ok(PollResult::Terminal(TaskStatus::Failed));
                }
            }
        }
    }

    // ---- private helpers ----

    /// Transition to `TimedOut` with the distinct deadline error text.
    fn timed_out(
        &self,
        task_id: TaskId,
        timeout: Duration,
        kind: &str,
    ) -> Result<PollResult, CoreError> {
        self.registry.with_task_mut(task_id, |t| {
            t.mark_timed_out(format!(
                "Timed out after {}s waiting for {kind} job",
                timeout.as_secs()
            ))
        })?;
        tracing::warn!(%task_id, timeout_secs = timeout.as_secs(), "Task timed out");
        Ok(PollResult::Terminal(TaskStatus::TimedOut))
    }

    /// Register one transient poll failure against the budget.
    ///
    /// Returns `Some(Terminal(Failed))` when the budget is spent.
    fn transient_failure(
        &self,
        task_id: TaskId,
        budget: &mut RetryBudget,
    ) -> Result<Option<PollResult>, CoreError> {
        match budget.register_failure() {
            RetryDecision::Retry {
                next_attempt,
                max_attempts,
            } => {
                self.bus.publish(TaskEvent::TaskRetrying {
                    batch_id: self.batch_id,
                    task_id,
                    attempt: next_attempt,
                    max_attempts,
                    message: self.policy.attempt_message(next_attempt),
                });
                Ok(None)
            }
            RetryDecision::Exhausted => {
                self.registry.with_task_mut(task_id, |t| {
                    t.mark_failed(format!(
                        "Poll retries exhausted after {} attempts",
                        budget.used()
                    ))
                })?;
                Ok(Some(PollResult::Terminal(TaskStatus::Failed)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use storyforge_core::task::{TaskKind, TaskOutput, TaskRecord};
    use storyforge_providers::{PollResponse, ProviderError};

    /// Client whose poll answers are scripted; an exhausted script
    /// keeps answering "queued".
    struct ScriptedPolls {
        responses: Mutex<VecDeque<Result<PollResponse, ProviderError>>>,
    }

    impl ScriptedPolls {
        fn new(responses: Vec<Result<PollResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    fn queued() -> PollResponse {
        PollResponse {
            status: RemoteStatus::Queued,
            progress: None,
            output: None,
            error: None,
        }
    }

    fn running(progress: f64) -> PollResponse {
        PollResponse {
            status: RemoteStatus::Running,
            progress: Some(progress),
            output: None,
            error: None,
        }
    }

    fn succeeded(url: &str) -> PollResponse {
        PollResponse {
            status: RemoteStatus::Succeeded,
            progress: Some(1.0),
            output: Some(TaskOutput::Url(url.into())),
            error: None,
        }
    }

    fn failed(reason: &str) -> PollResponse {
        PollResponse {
            status: RemoteStatus::Failed,
            progress: None,
            output: None,
            error: Some(reason.into()),
        }
    }

    #[async_trait]
    impl JobClient for ScriptedPolls {
        fn kind(&self) -> TaskKind {
            TaskKind::Video
        }

        async fn submit(&self, _parameters: &serde_json::Value) -> Result<String, ProviderError> {
            Ok("job-1".into())
        }

        async fn poll(&self, _external_job_id: &str) -> Result<PollResponse, ProviderError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(queued()))
        }
    }

    fn polling_task(registry: &TaskRegistry) -> TaskId {
        let mut task = TaskRecord::new(TaskKind::Video, serde_json::json!({}), 0);
        task.mark_submitting().unwrap();
        task.mark_polling("job-1").unwrap();
        let id = task.id;
        registry.insert(task);
        id
    }

    fn poller<'a>(
        client: &'a dyn JobClient,
        registry: &'a TaskRegistry,
        bus: &'a EventBus,
    ) -> StatusPoller<'a> {
        StatusPoller {
            client,
            registry,
            bus,
            batch_id: uuid::Uuid::new_v4(),
            interval: Duration::from_secs(2),
            policy: RetryPolicy::new(10, Duration::from_secs(1)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_to_success() {
        let client = ScriptedPolls::new(vec![
            Ok(queued()),
            Ok(running(0.3)),
            Ok(running(0.8)),
            Ok(succeeded("https://cdn/clip.mp4")),
        ]);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let task_id = polling_task(&registry);

        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(50), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Terminal(TaskStatus::Succeeded));
        let task = registry.get(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(
            task.output,
            Some(TaskOutput::Url("https://cdn/clip.mp4".into()))
        );

        // Two progress events were published with increasing values.
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::TaskProgress { progress, .. } = event {
                seen.push(progress);
            }
        }
        assert_eq!(seen, vec![0.3, 0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_fails_the_task() {
        let client = ScriptedPolls::new(vec![Ok(queued()), Ok(failed("NSFW content detected"))]);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let task_id = polling_task(&registry);

        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(50), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Terminal(TaskStatus::Failed));
        let task = registry.get(task_id).unwrap();
        assert_eq!(task.error.as_deref(), Some("NSFW content detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_produces_timed_out_within_one_interval() {
        // Script never terminates: always queued.
        let client = ScriptedPolls::new(vec![]);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let task_id = polling_task(&registry);

        let started = Instant::now();
        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(50), &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result, PollResult::Terminal(TaskStatus::TimedOut));
        assert!(elapsed >= Duration::from_secs(50));
        assert!(elapsed <= Duration::from_secs(52), "elapsed: {elapsed:?}");

        let task = registry.get(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::TimedOut);
        assert!(task.error.as_deref().unwrap().contains("Timed out after 50s"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_exhaust_budget() {
        let errors: Vec<Result<PollResponse, ProviderError>> = (0..20)
            .map(|_| {
                Err(ProviderError::Api {
                    status: 503,
                    body: "unavailable".into(),
                })
            })
            .collect();
        let client = ScriptedPolls::new(errors);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let task_id = polling_task(&registry);

        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(500), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Terminal(TaskStatus::Failed));
        let task = registry.get(task_id).unwrap();
        assert!(task.error.as_deref().unwrap().contains("exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_poll_error_fails_immediately() {
        let client = ScriptedPolls::new(vec![Err(ProviderError::Rejected(
            "content policy".into(),
        ))]);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let task_id = polling_task(&registry);

        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(50), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Terminal(TaskStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_record_non_terminal() {
        let client = ScriptedPolls::new(vec![]);
        let registry = TaskRegistry::new();
        let bus = EventBus::default();
        let task_id = polling_task(&registry);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel_clone.cancel();
        });

        let result = poller(&client, &registry, &bus)
            .run(task_id, Duration::from_secs(50), &cancel)
            .await
            .unwrap();

        assert_matches!(result, PollResult::Cancelled);
        assert_eq!(registry.status(task_id), Some(TaskStatus::Polling));
    }
}
