//! Shared HTTP plumbing for the provider adapters.

use serde::Deserialize;

use crate::error::ProviderError;

/// Error envelope used by the generation providers on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Error codes the providers use for content-policy rejections.
const REJECTION_CODES: &[&str] = &["content_rejected", "content_policy_violation", "moderation"];

/// Ensure the response has a success status code.
///
/// On failure the body is inspected: a recognizable content-policy
/// rejection becomes [`ProviderError::Rejected`] (permanent), anything
/// else becomes [`ProviderError::Api`] carrying the raw body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());

    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) {
        if REJECTION_CODES.contains(&parsed.error.code.as_str()) {
            return Err(ProviderError::Rejected(parsed.error.message));
        }
    }

    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
