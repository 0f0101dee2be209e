//! Provider error taxonomy.
//!
//! The retry governor only needs one bit from an error: transient
//! (eligible for retry) or permanent (fail immediately). The split is
//! decided here, next to where the errors are produced.

/// Errors from the provider client layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider rejected the request content (e.g. content policy).
    /// Never retried.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// The response could not be interpreted (unparseable body, unknown
    /// status vocabulary).
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the error is worth retrying.
    ///
    /// Content rejections are permanent. HTTP errors are retried only
    /// for request timeouts, rate limiting, and server-side failures;
    /// other 4xx codes indicate a bad request that will not improve.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            ProviderError::Rejected(_) => false,
            ProviderError::Malformed(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        for status in [500, 502, 503, 504] {
            let err = ProviderError::Api {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "status {status} should be transient");
        }
    }

    #[test]
    fn throttling_is_transient() {
        for status in [408, 429] {
            let err = ProviderError::Api {
                status,
                body: String::new(),
            };
            assert!(err.is_transient());
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let err = ProviderError::Api {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "status {status} should be permanent");
        }
    }

    #[test]
    fn rejection_is_permanent() {
        assert!(!ProviderError::Rejected("policy".into()).is_transient());
    }

    #[test]
    fn malformed_is_transient() {
        assert!(ProviderError::Malformed("garbled".into()).is_transient());
    }
}
