//! Orchestration tunables.
//!
//! The retry/timeout constants below were tuned empirically against the
//! real providers, not derived; they are configuration defaults, not
//! contracts. Every one can be overridden via environment variables.

use std::time::Duration;

use crate::error::CoreError;
use crate::task::TaskKind;

/// Default cadence of the status poller.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default constant delay between retry attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default maximum number of resubmissions per task.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default per-task deadlines by job kind, in seconds. Video-class jobs
/// are the slowest provider calls we make; text streaming can run long.
pub const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 50;
pub const DEFAULT_TEXT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SPEECH_TIMEOUT_SECS: u64 = 60;

/// Orchestrator configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via
/// environment variables in production.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interval between status polls for an in-flight task.
    pub poll_interval: Duration,
    /// Constant delay between retry attempts (submission and polling).
    pub retry_delay: Duration,
    /// Maximum number of resubmissions before a task is failed.
    pub max_retries: u32,
    /// Hard wall-clock deadline for image tasks, measured from submission.
    pub image_timeout: Duration,
    /// Hard wall-clock deadline for video tasks.
    pub video_timeout: Duration,
    /// Hard wall-clock deadline for text tasks.
    pub text_timeout: Duration,
    /// Hard wall-clock deadline for speech tasks.
    pub speech_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            image_timeout: Duration::from_secs(DEFAULT_IMAGE_TIMEOUT_SECS),
            video_timeout: Duration::from_secs(DEFAULT_VIDEO_TIMEOUT_SECS),
            text_timeout: Duration::from_secs(DEFAULT_TEXT_TIMEOUT_SECS),
            speech_timeout: Duration::from_secs(DEFAULT_SPEECH_TIMEOUT_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default |
    /// |-----------------------|---------|
    /// | `POLL_INTERVAL_MS`    | `2000`  |
    /// | `RETRY_DELAY_MS`      | `1000`  |
    /// | `MAX_RETRIES`         | `10`    |
    /// | `IMAGE_TIMEOUT_SECS`  | `30`    |
    /// | `VIDEO_TIMEOUT_SECS`  | `50`    |
    /// | `TEXT_TIMEOUT_SECS`   | `120`   |
    /// | `SPEECH_TIMEOUT_SECS` | `60`    |
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_u64(
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            retry_delay: Duration::from_millis(env_u64("RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)),
            max_retries: env_u64("MAX_RETRIES", DEFAULT_MAX_RETRIES as u64) as u32,
            image_timeout: Duration::from_secs(env_u64(
                "IMAGE_TIMEOUT_SECS",
                DEFAULT_IMAGE_TIMEOUT_SECS,
            )),
            video_timeout: Duration::from_secs(env_u64(
                "VIDEO_TIMEOUT_SECS",
                DEFAULT_VIDEO_TIMEOUT_SECS,
            )),
            text_timeout: Duration::from_secs(env_u64(
                "TEXT_TIMEOUT_SECS",
                DEFAULT_TEXT_TIMEOUT_SECS,
            )),
            speech_timeout: Duration::from_secs(env_u64(
                "SPEECH_TIMEOUT_SECS",
                DEFAULT_SPEECH_TIMEOUT_SECS,
            )),
        }
    }

    /// The wall-clock deadline for a task of the given kind.
    pub fn timeout_for(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Image => self.image_timeout,
            TaskKind::Video => self.video_timeout,
            TaskKind::Text => self.text_timeout,
            TaskKind::Speech => self.speech_timeout,
        }
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::Validation(
                "poll_interval must be positive".to_string(),
            ));
        }
        for (name, timeout) in [
            ("image_timeout", self.image_timeout),
            ("video_timeout", self.video_timeout),
            ("text_timeout", self.text_timeout),
            ("speech_timeout", self.speech_timeout),
        ] {
            if timeout.is_zero() {
                return Err(CoreError::Validation(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Read a u64 env var, falling back to `default` when unset.
///
/// Panics on unparseable values; configuration errors should stop
/// startup, not be silently replaced.
fn env_u64(var: &str, default: u64) -> u64 {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{var} must be a valid integer, got {value:?}")),
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
