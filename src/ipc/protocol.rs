//! Wire types exchanged with the IDE extension
//!
//! Field names follow the extension's camelCase JSON.

use serde::{Deserialize, Serialize};

/// Value of the `type` field of every outgoing ask request
pub const ASK_REQUEST_TYPE: &str = "io";

/// Path on the peer that accepts ask requests
pub const ASK_PATH: &str = "/ask";

/// Path on the callback listener that accepts resolutions
pub const RESPONSE_PATH: &str = "/response";

/// Outgoing request: POST `http://127.0.0.1:<candidate>/ask`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: String,
    /// Prompt shown to the human
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Port of this process's callback listener
    pub callback_port: u16,
}

impl AskRequest {
    pub fn new(
        request_id: impl Into<String>,
        reason: impl Into<String>,
        options: Vec<String>,
        callback_port: u16,
    ) -> Self {
        Self {
            kind: ASK_REQUEST_TYPE.to_string(),
            request_id: request_id.into(),
            reason: reason.into(),
            options,
            callback_port,
        }
    }
}

/// Peer's reply to an ask request.
///
/// Acceptance is `{"success": true}`; a soft failure is a 5xx with
/// `{"error": ..., "details": ...}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AskReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AskReply {
    /// Human-readable soft-failure description.
    pub fn failure_message(&self) -> String {
        let error = self.error.as_deref().unwrap_or("unknown error");
        match self.details.as_deref().filter(|d| !d.is_empty()) {
            Some(details) => format!("{} - {}", error, details),
            None => error.to_string(),
        }
    }
}

/// Incoming resolution: POST `/response` on the callback listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPayload {
    pub request_id: String,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub cancelled: bool,
}

/// Listener acknowledgement / error body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}
