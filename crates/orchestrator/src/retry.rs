//! Bounded-retry wrapper around provider calls.
//!
//! [`run_with_retry`] is the retry governor: the single place retry
//! attempts are counted. On a transient error it waits a short constant
//! delay and tries again, up to the configured attempt budget; a
//! permanent error (content rejection, bad request) fails immediately
//! without consuming the budget. Callers observe attempt bookkeeping
//! through the [`RetryEvent`] callback and surface it to users as a
//! "retrying, attempt k/N" progress string.

use std::future::Future;
use std::time::Duration;

use storyforge_core::config::OrchestratorConfig;
use storyforge_providers::ProviderError;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Tunable parameters for the bounded-retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed: the initial call plus `max_retries`
    /// resubmissions.
    pub max_attempts: u32,
    /// Constant delay between attempts. Deliberately not exponential:
    /// provider hiccups here are short-lived and the per-task deadline
    /// bounds the damage of a persistent outage.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_retries + 1,
            delay,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// Human-readable progress string for an upcoming attempt.
    pub fn attempt_message(&self, attempt: u32) -> String {
        format!("retrying, attempt {attempt}/{}", self.max_attempts)
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Attempt bookkeeping surfaced to the caller during the loop.
#[derive(Debug)]
pub enum RetryEvent<'a> {
    /// An attempt is about to be made (1-based).
    AttemptStarted { attempt: u32 },
    /// The attempt failed transiently. `will_retry` is false when the
    /// budget is spent and this failure is final.
    TransientFailure {
        attempt: u32,
        error: &'a ProviderError,
        will_retry: bool,
    },
}

/// Final outcome of [`run_with_retry`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The operation succeeded on attempt `attempts_used`.
    Ok { value: T, attempts_used: u32 },
    /// A permanent error occurred; retrying would not help.
    Permanent { error: ProviderError },
    /// Every attempt failed transiently.
    Exhausted { last_error: ProviderError },
    /// The cancellation token fired before an outcome was reached.
    Cancelled,
}

/// Run `op` with bounded retries under `policy`.
///
/// `observe` is invoked synchronously before every attempt and after
/// every transient failure, in order, so callers can keep task records
/// and progress strings in step with the loop. Both the operation and
/// the inter-attempt delay race against `cancel`.
pub async fn run_with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut observe: impl FnMut(RetryEvent<'_>),
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        observe(RetryEvent::AttemptStarted { attempt });

        let result = tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            result = op() => result,
        };

        let error = match result {
            Ok(value) => {
                return RetryOutcome::Ok {
                    value,
                    attempts_used: attempt,
                }
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            tracing::warn!(label, attempt, error = %error, "Permanent provider error");
            return RetryOutcome::Permanent { error };
        }

        let will_retry = attempt < policy.max_attempts;
        tracing::warn!(
            label,
            attempt,
            max_attempts = policy.max_attempts,
            error = %error,
            "Transient provider error",
        );
        observe(RetryEvent::TransientFailure {
            attempt,
            error: &error,
            will_retry,
        });

        if !will_retry {
            return RetryOutcome::Exhausted { last_error: error };
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// RetryBudget
// ---------------------------------------------------------------------------

/// Decision after registering one transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Budget remains; retry as attempt `next_attempt` of `max_attempts`.
    Retry {
        next_attempt: u32,
        max_attempts: u32,
    },
    /// The budget is spent; the task must fail.
    Exhausted,
}

/// Attempt counter for loops that cannot be expressed as a single
/// retried operation (the status poller interleaves its transient-error
/// budget with deadline checks and ordinary poll ticks).
#[derive(Debug)]
pub struct RetryBudget {
    max_attempts: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            used: 0,
        }
    }

    /// Register one transient failure and decide whether to continue.
    pub fn register_failure(&mut self) -> RetryDecision {
        self.used += 1;
        if self.used < self.max_attempts {
            RetryDecision::Retry {
                next_attempt: self.used + 1,
                max_attempts: self.max_attempts,
            }
        } else {
            RetryDecision::Exhausted
        }
    }

    /// Failures registered so far.
    pub fn used(&self) -> u32 {
        self.used
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ProviderError {
        ProviderError::Api {
            status: 503,
            body: "unavailable".into(),
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = run_with_retry(
            "test",
            &policy(10),
            &cancel,
            |_| {},
            || async {
                // Fail transiently three times, then succeed.
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(transient())
                } else {
                    Ok("job-1".to_string())
                }
            },
        )
        .await;

        assert_matches!(
            outcome,
            RetryOutcome::Ok { attempts_used: 4, ref value } if value == "job-1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_with_no_extra_attempt() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = run_with_retry(
            "test",
            &policy(10),
            &cancel,
            |_| {},
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(transient())
            },
        )
        .await;

        assert_matches!(outcome, RetryOutcome::Exhausted { .. });
        // Initial attempt + 10 retries, never an 11th retry.
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_immediately() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = run_with_retry(
            "test",
            &policy(10),
            &cancel,
            |_| {},
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(ProviderError::Rejected("content policy".into()))
            },
        )
        .await;

        assert_matches!(outcome, RetryOutcome::Permanent { .. });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_attempts() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        let outcome = run_with_retry(
            "test",
            &policy(10),
            &cancel,
            |_| {},
            || {
                // Cancel while the loop sleeps before the next attempt.
                cancel_clone.cancel();
                async { Err::<String, _>(transient()) }
            },
        )
        .await;

        assert_matches!(outcome, RetryOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_attempt_sequence() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let mut log = Vec::new();

        let _ = run_with_retry(
            "test",
            &policy(2),
            &cancel,
            |event| match event {
                RetryEvent::AttemptStarted { attempt } => log.push(format!("start {attempt}")),
                RetryEvent::TransientFailure {
                    attempt, will_retry, ..
                } => log.push(format!("fail {attempt} retry={will_retry}")),
            },
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(transient())
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(log, vec!["start 1", "fail 1 retry=true", "start 2"]);
    }

    #[test]
    fn attempt_message_format() {
        assert_eq!(policy(10).attempt_message(3), "retrying, attempt 3/11");
    }

    #[test]
    fn budget_counts_to_exhaustion() {
        let mut budget = RetryBudget::new(&policy(2));
        assert_matches!(
            budget.register_failure(),
            RetryDecision::Retry {
                next_attempt: 2,
                max_attempts: 3
            }
        );
        assert_matches!(budget.register_failure(), RetryDecision::Retry { .. });
        assert_matches!(budget.register_failure(), RetryDecision::Exhausted);
        assert_eq!(budget.used(), 3);
    }
}
