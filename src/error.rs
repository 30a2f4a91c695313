//! Error taxonomy for checkpoint dispatch and collection

use std::time::Duration;

/// Outcome-level failures of a `dispatch` or `collect` call.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// No candidate endpoint accepted the request
    #[error("Upstream connection failed: {detail}")]
    TransportUnavailable { detail: String },

    /// The caller-supplied deadline elapsed with no resolution
    #[error("No response within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The peer explicitly signalled cancellation
    #[error("User ended the exchange without further instructions")]
    Cancelled,

    /// Input failed schema validation at a boundary
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// History/identity store failure
    #[error("History store error: {0}")]
    Persistence(#[from] HistoryError),

    /// Local I/O failure of the filesystem transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub fn transport_unavailable(last_error: Option<String>) -> Self {
        CheckpointError::TransportUnavailable {
            detail: last_error.unwrap_or_else(|| "No endpoints available".to_string()),
        }
    }

    /// Message shown to the agent when the exchange did not produce an answer.
    pub fn user_message(&self) -> String {
        match self {
            CheckpointError::TransportUnavailable { .. } => format!(
                "{}\n\nThe IDE extension may not be running. \
                Please ensure the extension is installed and a window is open.",
                self
            ),
            CheckpointError::Cancelled => {
                "The user ended the session without further instructions.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Failures of the history/identity store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History store not enabled")]
    Disabled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store call timed out")]
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CheckpointError::transport_unavailable(None).to_string(),
            "Upstream connection failed: No endpoints available"
        );
        assert_eq!(
            CheckpointError::transport_unavailable(Some("Timeout on port 23983".to_string()))
                .to_string(),
            "Upstream connection failed: Timeout on port 23983"
        );
        assert_eq!(
            CheckpointError::Timeout(Duration::from_millis(1500)).to_string(),
            "No response within 1.5s"
        );
        assert_eq!(
            HistoryError::Disabled.to_string(),
            "History store not enabled"
        );
    }

    #[test]
    fn test_user_message_suggests_peer_not_running() {
        let message = CheckpointError::transport_unavailable(None).user_message();
        assert!(message.contains("may not be running"));

        let cancelled = CheckpointError::Cancelled.user_message();
        assert!(cancelled.contains("without further instructions"));
    }
}
