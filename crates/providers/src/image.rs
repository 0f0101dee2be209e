//! Client for the image synthesis service.

use async_trait::async_trait;
use serde::Deserialize;
use storyforge_core::task::{TaskKind, TaskOutput};

use crate::client::{JobClient, PollResponse};
use crate::error::ProviderError;
use crate::http::{ensure_success, parse_response};
use crate::status::{normalize_status, RemoteStatus};

/// HTTP client for the image generation endpoint.
pub struct ImageClient {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `POST /v1/images/generations`.
#[derive(Debug, Deserialize)]
struct SubmitBody {
    job_id: String,
}

/// Response from `GET /v1/images/generations/{job_id}`.
#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ImageClient {
    /// Create a client for the image service.
    ///
    /// * `base_url` - e.g. `https://images.example.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (connection pooling across adapters).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl JobClient for ImageClient {
    fn kind(&self) -> TaskKind {
        TaskKind::Image
    }

    async fn submit(&self, parameters: &serde_json::Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
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
                "{}/v1/images/generations/{external_job_id}",
                self.base_url
            ))
            .send()
            .await?;

        let body: StatusBody = parse_response(response).await?;
        let status = normalize_status(&body.status)?;

        let output = match (status, body.image_url) {
            (RemoteStatus::Succeeded, Some(url)) => Some(TaskOutput::Url(url)),
            (RemoteStatus::Succeeded, None) => {
                return Err(ProviderError::Malformed(
                    "Succeeded image job carries no image_url".to_string(),
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
                "{}/v1/images/generations/{external_job_id}/cancel",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_with_result_parses() {
        let body: StatusBody = serde_json::from_str(
            r#"{"status": "completed", "progress": 1.0, "image_url": "https://cdn/a.png"}"#,
        )
        .unwrap();
        assert_eq!(body.status, "completed");
        assert_eq!(body.image_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn status_body_minimal_parses() {
        let body: StatusBody = serde_json::from_str(r#"{"status": "queued"}"#).unwrap();
        assert!(body.progress.is_none());
        assert!(body.image_url.is_none());
        assert!(body.error.is_none());
    }
}
