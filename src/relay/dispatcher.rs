//! Dispatcher
//!
//! Sends a prompt to the first peer that accepts it, then suspends the caller
//! until the callback listener resolves the correlation entry, the optional
//! deadline elapses, or the listener goes away.
//!
//! Candidates are tried one at a time. Accepting on several windows at once
//! would show the human duplicate prompts, so the first acceptance ends the scan.

use super::correlation::{CorrelationTable, Resolution, WaitOutcome};
use super::discovery::EndpointRegistry;
use super::parser;
use crate::config::Config;
use crate::error::CheckpointError;
use crate::history::HistoryRecorder;
use crate::ipc::protocol::{AskReply, AskRequest, ASK_PATH};
use crate::models::{Request, RequestStatus, Response, Segment};
use reqwest::Client;
use std::time::Duration;

/// Everything the caller can say about one checkpoint.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub prompt: String,
    pub options: Vec<String>,
    /// Overrides the dispatcher's default deadline. Ignored for pauses.
    pub deadline: Option<Duration>,
    pub session_id: Option<String>,
    pub is_pause: bool,
}

impl DispatchRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Indefinite wait with a single "Continue" option.
    pub fn pause(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: vec!["Continue".to_string()],
            is_pause: true,
            ..Default::default()
        }
    }
}

/// Correlation engine front door.
#[derive(Clone)]
pub struct Dispatcher {
    registry: EndpointRegistry,
    table: CorrelationTable,
    history: HistoryRecorder,
    client: Client,
    callback_port: u16,
    attempt_timeout: Duration,
    default_deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: EndpointRegistry,
        table: CorrelationTable,
        history: HistoryRecorder,
        callback_port: u16,
    ) -> Self {
        Self {
            registry,
            table,
            history,
            client: loopback_client(),
            callback_port,
            attempt_timeout: Duration::from_secs(5),
            default_deadline: None,
        }
    }

    /// Build a dispatcher with the endpoint registry, timeouts and deadline from `config`.
    pub fn from_config(
        config: &Config,
        table: CorrelationTable,
        history: HistoryRecorder,
        callback_port: u16,
    ) -> Self {
        Self::new(EndpointRegistry::from_config(config), table, history, callback_port)
            .with_attempt_timeout(config.attempt_timeout())
            .with_default_deadline(config.dispatch_timeout())
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    /// Dispatch and parse the answer into content segments.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<Vec<Segment>, CheckpointError> {
        let raw = self.dispatch_raw(request).await?;
        Ok(parser::parse(&raw))
    }

    /// Dispatch and return the unparsed answer text.
    pub async fn dispatch_raw(&self, request: DispatchRequest) -> Result<String, CheckpointError> {
        let deadline = if request.is_pause {
            None
        } else {
            request.deadline.or(self.default_deadline)
        };

        let record = Request::new(request.prompt, request.options)
            .with_session(request.session_id)
            .with_pause(request.is_pause);
        let request_id = record.request_id.clone();

        let mut entry = self.table.register(&request_id).ok_or_else(|| {
            CheckpointError::MalformedPayload(format!(
                "Request id {} is already outstanding",
                request_id
            ))
        })?;
        self.history.record_request_created(&record).await;

        let ask = AskRequest::new(
            &request_id,
            &record.prompt,
            record.options.clone(),
            self.callback_port,
        );

        let mut last_error = None;
        let mut accepted = false;
        for port in self.registry.discover() {
            match self.attempt(port, &ask).await {
                Ok(()) => {
                    log::info!("Request {} accepted on port {}", request_id, port);
                    accepted = true;
                    break;
                }
                Err(message) => {
                    log::debug!("Port {} did not accept {}: {}", port, request_id, message);
                    last_error = Some(message);
                }
            }
        }

        // A peer may have answered even though its acknowledgement was lost;
        // in that case the entry is already gone and the resolution is waiting.
        if !accepted && entry.withdraw() {
            log::warn!("No endpoint accepted request {}", request_id);
            self.history
                .record_status(&request_id, RequestStatus::Cancelled)
                .await;
            return Err(CheckpointError::transport_unavailable(last_error));
        }

        match entry.wait(deadline).await {
            WaitOutcome::Resolved(Resolution::Answered(text)) => {
                self.history
                    .record_response(&Response::new(&request_id, &text, false))
                    .await;
                Ok(text)
            }
            WaitOutcome::Resolved(Resolution::Cancelled) => {
                log::info!("Request {} cancelled by user", request_id);
                self.history
                    .record_response(&Response::new(&request_id, "", true))
                    .await;
                Err(CheckpointError::Cancelled)
            }
            WaitOutcome::TimedOut => {
                // `wait` only times out when a deadline was given
                let deadline = deadline.unwrap_or_default();
                log::warn!(
                    "Request {} timed out after {}s",
                    request_id,
                    deadline.as_secs_f64()
                );
                self.history
                    .record_status(&request_id, RequestStatus::Timeout)
                    .await;
                Err(CheckpointError::Timeout(deadline))
            }
            WaitOutcome::Abandoned => {
                self.history
                    .record_status(&request_id, RequestStatus::Cancelled)
                    .await;
                Err(CheckpointError::transport_unavailable(Some(
                    "Callback listener stopped".to_string(),
                )))
            }
        }
    }

    /// One candidate attempt. `Err` carries the failure message for this port.
    async fn attempt(&self, port: u16, ask: &AskRequest) -> Result<(), String> {
        let url = format!("http://127.0.0.1:{}{}", port, ASK_PATH);

        let response = match self
            .client
            .post(&url)
            .timeout(self.attempt_timeout)
            .json(ask)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(format!("Timeout on port {}", port)),
            Err(e) if e.is_connect() => return Err(format!("Cannot connect to port {}", port)),
            Err(e) => return Err(format!("Request to port {} failed: {}", port, e)),
        };

        let status = response.status();
        let reply: AskReply = response.json().await.unwrap_or_default();

        if status.is_success() && reply.success {
            Ok(())
        } else if status.is_server_error() {
            Err(reply.failure_message())
        } else {
            Err(format!(
                "Port {} declined the request (HTTP {})",
                port,
                status.as_u16()
            ))
        }
    }
}

/// Peers only ever listen on loopback, so system proxies are bypassed.
fn loopback_client() -> Client {
    Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|_| Client::new())
}
