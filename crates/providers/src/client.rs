//! The [`JobClient`] contract shared by all provider adapters.

use async_trait::async_trait;
use storyforge_core::task::{TaskKind, TaskOutput};

use crate::error::ProviderError;
use crate::status::RemoteStatus;

/// Normalized answer to a status poll.
#[derive(Debug, Clone)]
pub struct PollResponse {
    /// Remote job status, folded into the fixed vocabulary.
    pub status: RemoteStatus,
    /// Remote-reported completion fraction in `[0, 1]`, when available.
    pub progress: Option<f64>,
    /// Result payload; present once `status` is `Succeeded`.
    pub output: Option<TaskOutput>,
    /// Provider-reported failure reason; present when `status` is `Failed`.
    pub error: Option<String>,
}

/// A client for one external generation service.
///
/// Implementations are stateless: `submit` and `poll` are pure network
/// calls and mutate no local state. One implementation exists per
/// [`TaskKind`].
#[async_trait]
pub trait JobClient: Send + Sync {
    /// The job kind this client handles.
    fn kind(&self) -> TaskKind;

    /// Submit one job. Returns the provider-assigned job identifier.
    async fn submit(&self, parameters: &serde_json::Value) -> Result<String, ProviderError>;

    /// Query the current status of a previously submitted job.
    async fn poll(&self, external_job_id: &str) -> Result<PollResponse, ProviderError>;

    /// Ask the provider to cancel a job.
    ///
    /// The orchestrator never relies on this: a timed-out task is only
    /// abandoned locally. Adapters whose provider exposes a cancel
    /// endpoint may override the default no-op.
    async fn cancel(&self, external_job_id: &str) -> Result<(), ProviderError> {
        let _ = external_job_id;
        Ok(())
    }
}
