//! Remote status normalization.
//!
//! Each provider reports job status in its own vocabulary ("starting",
//! "in_progress", "complete", ...). The orchestrator only understands
//! the four values of [`RemoteStatus`]; [`normalize_status`] is the
//! single place where provider vocabularies are folded into that set.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Normalized remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// Accepted by the provider, not yet executing.
    Queued,
    /// Executing on the provider.
    Running,
    /// Finished with a result available.
    Succeeded,
    /// Finished unsuccessfully.
    Failed,
}

impl RemoteStatus {
    /// Whether the remote job has finished, one way or the other.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Succeeded | RemoteStatus::Failed)
    }
}

/// Fold a provider-reported status string into [`RemoteStatus`].
///
/// Matching is case-insensitive. Unknown vocabulary is an error rather
/// than a silent default: a provider adding a new status must not be
/// mistaken for success or failure.
pub fn normalize_status(raw: &str) -> Result<RemoteStatus, ProviderError> {
    match raw.to_ascii_lowercase().as_str() {
        "queued" | "pending" | "submitted" | "waiting" | "starting" => Ok(RemoteStatus::Queued),
        "running" | "processing" | "in_progress" | "generating" | "active" => {
            Ok(RemoteStatus::Running)
        }
        "succeeded" | "success" | "completed" | "complete" | "done" | "finished" => {
            Ok(RemoteStatus::Succeeded)
        }
        "failed" | "failure" | "error" | "errored" | "canceled" | "cancelled" => {
            Ok(RemoteStatus::Failed)
        }
        other => Err(ProviderError::Malformed(format!(
            "Unknown remote status: {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn queued_vocabulary() {
        for raw in ["queued", "pending", "submitted", "waiting", "starting"] {
            assert_eq!(normalize_status(raw).unwrap(), RemoteStatus::Queued);
        }
    }

    #[test]
    fn running_vocabulary() {
        for raw in ["running", "processing", "in_progress", "generating"] {
            assert_eq!(normalize_status(raw).unwrap(), RemoteStatus::Running);
        }
    }

    #[test]
    fn succeeded_vocabulary() {
        for raw in ["succeeded", "success", "completed", "done"] {
            assert_eq!(normalize_status(raw).unwrap(), RemoteStatus::Succeeded);
        }
    }

    #[test]
    fn failed_vocabulary() {
        for raw in ["failed", "error", "cancelled"] {
            assert_eq!(normalize_status(raw).unwrap(), RemoteStatus::Failed);
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(normalize_status("RUNNING").unwrap(), RemoteStatus::Running);
        assert_eq!(normalize_status("Completed").unwrap(), RemoteStatus::Succeeded);
    }

    #[test]
    fn unknown_vocabulary_is_an_error() {
        assert_matches!(
            normalize_status("transcending"),
            Err(ProviderError::Malformed(_))
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(RemoteStatus::Succeeded.is_terminal());
        assert!(RemoteStatus::Failed.is_terminal());
        assert!(!RemoteStatus::Queued.is_terminal());
        assert!(!RemoteStatus::Running.is_terminal());
    }
}
