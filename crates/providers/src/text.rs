//! Client for the text generation service.
//!
//! The text provider uses a create-then-poll pattern: task creation
//! returns an id immediately and the finished text is fetched by a
//! separate status query, so it fits the same submit/poll contract as
//! the media endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use storyforge_core::task::{TaskKind, TaskOutput};

use crate::client::{JobClient, PollResponse};
use crate::error::ProviderError;
use crate::http::parse_response;
use crate::status::{normalize_status, RemoteStatus};

/// HTTP client for the text generation endpoint.
pub struct TextClient {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `POST /v1/text/tasks`.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    task_id: String,
}

/// Response from `GET /v1/text/tasks/{task_id}`.
#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TextClient {
    /// Create a client for the text service.
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
impl JobClient for TextClient {
    fn kind(&self) -> TaskKind {
        TaskKind::Text
    }

    async fn submit(&self, parameters: &serde_json::Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/text/tasks", self.base_url))
            .json(parameters)
            .send()
            .await?;

        let body: SubmitBody = parse_response(response).await?;
        Ok(body.task_id)
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/text/tasks/{external_job_id}", self.base_url))
            .send()
            .await?;

        let body: StatusBody = parse_response(response).await?;
        let status = normalize_status(&body.status)?;

        let output = match (status, body.output) {
            (RemoteStatus::Succeeded, Some(text)) => Some(TaskOutput::Text(text)),
            (RemoteStatus::Succeeded, None) => {
                return Err(ProviderError::Malformed(
                    "Succeeded text task carries no output".to_string(),
                ))
            }
            _ => None,
        };

        // The text provider reports no incremental progress.
        Ok(PollResponse {
            status,
            progress: None,
            output,
            error: body.error,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
