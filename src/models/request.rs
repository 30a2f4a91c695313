use crate::utils::time;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a checkpoint request.
///
/// `Pending` is the only non-terminal state. Once a request reaches
/// `Completed`, `Cancelled` or `Timeout` it never changes again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Completed,
    Cancelled,
    Timeout,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Cancelled => "CANCELLED",
            RequestStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "CANCELLED" => Ok(RequestStatus::Cancelled),
            "TIMEOUT" => Ok(RequestStatus::Timeout),
            other => Err(format!("Unknown request status '{}'", other)),
        }
    }
}

/// Generate a fresh correlation id (random 128-bit UUID v4).
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A prompt sent to the human through the peer front-end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub request_id: String,
    /// Groups requests of one logical conversation. Defaults to `request_id`.
    pub session_id: String,
    pub prompt: String,
    /// Quick-reply labels, in display order.
    #[serde(default)]
    pub options: Vec<String>,
    pub status: RequestStatus,
    /// Indefinite-wait variant with a single "Continue" option.
    #[serde(default)]
    pub is_pause: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Request {
    pub fn new(prompt: impl Into<String>, options: Vec<String>) -> Self {
        let request_id = new_request_id();
        let now = time::now_utc();
        Self {
            session_id: request_id.clone(),
            request_id,
            prompt: prompt.into(),
            options,
            status: RequestStatus::Pending,
            is_pause: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Attach the request to an existing session. Blank ids are ignored.
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        if let Some(id) = session_id.filter(|s| !s.trim().is_empty()) {
            self.session_id = id;
        }
        self
    }

    pub fn with_pause(mut self, is_pause: bool) -> Self {
        self.is_pause = is_pause;
        self
    }

    /// Move to `status`. Returns false (and changes nothing) when the request
    /// is already terminal.
    pub fn transition(&mut self, status: RequestStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at = time::now_utc();
        true
    }
}

/// The human's answer to a [`Request`]. Exactly one per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub request_id: String,
    pub text: String,
    pub cancelled: bool,
    pub created_at: String,
}

impl Response {
    pub fn new(request_id: impl Into<String>, text: impl Into<String>, cancelled: bool) -> Self {
        Self {
            request_id: request_id.into(),
            text: text.into(),
            cancelled,
            created_at: time::now_utc(),
        }
    }

    /// Status the owning request moves to once this response is recorded.
    pub fn resulting_status(&self) -> RequestStatus {
        if self.cancelled {
            RequestStatus::Cancelled
        } else {
            RequestStatus::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_defaults_session_to_own_id() {
        let request = Request::new("Review the diff", vec![]);
        assert_eq!(request.session_id, request.request_id);
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(!request.is_pause);
    }

    #[test]
    fn test_request_with_session() {
        let request = Request::new("p", vec![]).with_session(Some("conv-1".to_string()));
        assert_eq!(request.session_id, "conv-1");

        let blank = Request::new("p", vec![]).with_session(Some("   ".to_string()));
        assert_eq!(blank.session_id, blank.request_id);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_request_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_terminal_request_is_immutable() {
        let mut request = Request::new("p", vec![]);
        assert!(request.transition(RequestStatus::Completed));
        assert!(!request.transition(RequestStatus::Timeout));
        assert_eq!(request.status, RequestStatus::Completed);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
            RequestStatus::Timeout,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&RequestStatus::Timeout).unwrap();
        assert_eq!(json, "\"TIMEOUT\"");
    }

    #[test]
    fn test_response_resulting_status() {
        assert_eq!(
            Response::new("r", "ok", false).resulting_status(),
            RequestStatus::Completed
        );
        assert_eq!(
            Response::new("r", "", true).resulting_status(),
            RequestStatus::Cancelled
        );
    }
}
