//! Client for the video synthesis service.
//!
//! Video jobs are the slowest provider calls the pipeline makes and the
//! only ones we also cancel provider-side: abandoning a timed-out video
//! job locally leaves expensive GPU work running, so [`JobClient::cancel`]
//! is wired to the provider's cancel endpoint here.

use async_trait::async_trait;
use serde::Deserialize;
use storyforge_core::task::{TaskKind, TaskOutput};

use crate::client::{JobClient, PollResponse};
use crate::error::ProviderError;
use crate::http::{ensure_success, parse_response};
use crate::status::{normalize_status, RemoteStatus};

/// HTTP client for the video generation endpoint.
pub struct VideoClient {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `POST /v1/videos/generations`.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    job_id: String,
}

/// Response from `GET /v1/videos/generations/{job_id}`.
#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl VideoClient {
    /// Create a client for the video service.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl JobClient for VideoClient {
    fn kind(&self) -> TaskKind {
        TaskKind::Video
    }

    async fn submit(&self, parameters: &serde_json::Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/videos/generations", self.base_url))
            .json(parameters)
            .send()
            .await?;

        let body: SubmitBody = parse_response(response).await?;
        Ok(body.job_id)
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollResponse, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/videos/generations/{external_job_id}",
                self.base_url
            ))
            .send()
            .await?;

        let body: StatusBody = parse_response(response).await?;
        let status = normalize_status(&body.status)?;

        let output = match (status, body.video_url) {
            (RemoteStatus::Succeeded, Some(url)) => Some(TaskOutput::Url(url)),
            (RemoteStatus::Succeeded, None) => {
                return Err(ProviderError::Malformed(
                    "Succeeded video job carries no video_url".to_string(),
                ))
            }
            _ => None,
        };

        Ok(PollResponse {
            status,
            progress: body.progress,
            output,
            error: body.error,
        })
    }

    async fn cancel(&self, external_job_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/videos/generations/{external_job_id}/cancel",
                self.base_url
            ))
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
