//! Client for the speech synthesis service.
//!
//! Same create-then-poll pattern as the text provider; the finished
//! narration is delivered as an audio file URL.

use async_trait::async_trait;
use serde::Deserialize;
use storyforge_core::task::{TaskKind, TaskOutput};

use crate::client::{JobClient, PollResponse};
use crate::error::ProviderError;
use crate::http::parse_response;
use crate::status::{normalize_status, RemoteStatus};

/// HTTP client for the speech synthesis endpoint.
pub struct SpeechClient {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `POST /v1/speech/tasks`.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    task_id: String,
}

/// Response from `GET /v1/speech/tasks/{task_id}`.
#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SpeechClient {
    /// Create a client for the speech service.
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
impl JobClient for SpeechClient {
    fn kind(&self) -> TaskKind {
        TaskKind::Speech
    }

    async fn submit(&self, parameters: &serde_json::Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/speech/tasks", self.base_url))
            .json(parameters)
            .send()
            .await?;

        let body: SubmitBody = parse_response(response).await?;
        Ok(body.task_id)
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollResponse, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/speech/tasks/{external_job_id}",
                self.base_url
            ))
            .send()
            .await?;

        let body: StatusBody = parse_response(response).await?;
        let status = normalize_status(&body.status)?;

        let output = match (status, body.audio_url) {
            (RemoteStatus::Succeeded, Some(url)) => Some(TaskOutput::Url(url)),
            (RemoteStatus::Succeeded, None) => {
                return Err(ProviderError::Malformed(
                    "Succeeded speech task carries no audio_url".to_string(),
                ))
            }
            _ => None,
        };

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
