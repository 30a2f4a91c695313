//! Filesystem Transport
//!
//! Pull-style alternative to the callback listener, used by the `collect`
//! command. The request is written to `pending/<id>.json`; the peer answers by
//! writing `completed/<id>.json`, which is polled at a fixed interval.
//! Everything happens on one execution path, so there is no shared state.

use crate::config::Config;
use crate::error::CheckpointError;
use crate::models::new_request_id;
use crate::utils::time;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What the agent asks for, plus display metadata for the peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectRequest {
    pub project: String,
    pub summary: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub title: Option<String>,
    pub options: Vec<String>,
}

/// `pending/<id>.json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile<'a> {
    id: &'a str,
    project: &'a str,
    summary: &'a str,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    options: &'a [String],
}

/// `completed/<id>.json`, written by the peer
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseFile {
    pub content: String,
    pub images: Vec<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub agent_id: Option<String>,
}

/// Result printed by the `collect` command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResult {
    pub content: String,
    pub images: Vec<String>,
    pub timestamp: String,
    pub success: bool,
    pub model: String,
    pub session_id: String,
    pub title: String,
    pub agent_id: String,
}

impl FeedbackResult {
    pub fn from_response(response: ResponseFile) -> Self {
        Self {
            content: response.content,
            images: response.images,
            timestamp: time::now_utc(),
            success: true,
            model: response.model.unwrap_or_default(),
            session_id: response.session_id.unwrap_or_default(),
            title: response.title.unwrap_or_default(),
            agent_id: response.agent_id.unwrap_or_default(),
        }
    }

    /// Empty result reported when no answer arrived.
    pub fn unanswered() -> Self {
        Self {
            content: String::new(),
            images: Vec::new(),
            timestamp: time::now_utc(),
            success: false,
            model: String::new(),
            session_id: String::new(),
            title: String::new(),
            agent_id: String::new(),
        }
    }
}

/// Filesystem request/response exchange.
#[derive(Debug, Clone)]
pub struct FsTransport {
    pending_dir: PathBuf,
    completed_dir: PathBuf,
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl FsTransport {
    /// Exchange through `<requests_dir>/pending` and `<requests_dir>/completed`.
    pub fn new(requests_dir: impl AsRef<Path>) -> Self {
        let requests_dir = requests_dir.as_ref();
        Self {
            pending_dir: requests_dir.join("pending"),
            completed_dir: requests_dir.join("completed"),
            poll_interval: Duration::from_millis(500),
            deadline: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            pending_dir: config.pending_dir(),
            completed_dir: config.completed_dir(),
            poll_interval: config.poll_interval(),
            deadline: config.collect_timeout(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` waits forever.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    pub fn completed_dir(&self) -> &Path {
        &self.completed_dir
    }

    /// Write the request and wait for the peer's answer.
    pub async fn collect(&self, request: &CollectRequest) -> Result<FeedbackResult, CheckpointError> {
        self.collect_until(request, std::future::pending::<()>())
            .await
    }

    /// Like [`collect`](Self::collect), but `interrupt` completing ends the wait
    /// with [`CheckpointError::Cancelled`]. Both request files are removed on
    /// every outcome.
    pub async fn collect_until<F>(
        &self,
        request: &CollectRequest,
        interrupt: F,
    ) -> Result<FeedbackResult, CheckpointError>
    where
        F: Future,
    {
        let request_id = new_request_id();
        self.write_request(&request_id, request).await?;
        log::info!(
            "Waiting for feedback [{}] in {}",
            short_id(&request_id),
            self.completed_dir.display()
        );

        let outcome = tokio::select! {
            response = self.wait_for_response(&request_id) => response,
            _ = interrupt => {
                log::info!("Feedback wait [{}] interrupted", short_id(&request_id));
                Err(CheckpointError::Cancelled)
            }
        };

        self.cleanup(&request_id).await;
        outcome.map(FeedbackResult::from_response)
    }

    async fn write_request(
        &self,
        request_id: &str,
        request: &CollectRequest,
    ) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.pending_dir).await?;
        tokio::fs::create_dir_all(&self.completed_dir).await?;

        let file = RequestFile {
            id: request_id,
            project: &request.project,
            summary: &request.summary,
            created_at: time::now_utc(),
            session_id: request.session_id.as_deref(),
            model: request.model.as_deref(),
            title: request.title.as_deref(),
            options: &request.options,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?;

        tokio::fs::write(self.pending_path(request_id), json).await?;
        Ok(())
    }

    async fn wait_for_response(&self, request_id: &str) -> Result<ResponseFile, CheckpointError> {
        let path = self.completed_path(request_id);
        let started = Instant::now();
        // The peer may be mid-write; a parse failure only counts once it repeats.
        let mut parse_failures = 0;

        loop {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => match serde_json::from_str::<ResponseFile>(&text) {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        parse_failures += 1;
                        if parse_failures > 1 {
                            return Err(CheckpointError::MalformedPayload(format!(
                                "{}: {}",
                                path.display(),
                                e
                            )));
                        }
                    }
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::debug!("Cannot read {}: {}", path.display(), e),
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    return Err(CheckpointError::Timeout(deadline));
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Remove both request files. Failures are logged, never returned.
    async fn cleanup(&self, request_id: &str) {
        for path in [self.pending_path(request_id), self.completed_path(request_id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    fn pending_path(&self, request_id: &str) -> PathBuf {
        self.pending_dir.join(format!("{}.json", request_id))
    }

    fn completed_path(&self, request_id: &str) -> PathBuf {
        self.completed_dir.join(format!("{}.json", request_id))
    }
}

fn short_id(request_id: &str) -> &str {
    request_id.get(..8).unwrap_or(request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transport(dir: &TempDir) -> FsTransport {
        FsTransport::new(dir.path()).with_poll_interval(Duration::from_millis(20))
    }

    /// Act as the peer: wait for a pending request, answer it with `body`.
    fn answer_with(transport: &FsTransport, body: &'static str) -> tokio::task::JoinHandle<String> {
        let pending = transport.pending_dir().to_path_buf();
        let completed = transport.completed_dir().to_path_buf();
        tokio::spawn(async move {
            loop {
                if let Ok(mut entries) = std::fs::read_dir(&pending) {
                    if let Some(Ok(entry)) = entries.next() {
                        let request = std::fs::read_to_string(entry.path()).unwrap_or_default();
                        // Skip a request file caught mid-write
                        if serde_json::from_str::<serde_json::Value>(&request).is_ok() {
                            std::fs::write(completed.join(entry.file_name()), body).unwrap();
                            return request;
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_collect_reads_response_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir);
        let peer = answer_with(
            &transport,
            r#"{"content":"looks good","images":["a.png"],"model":"opus","agentId":"swift-wolf-3f2a"}"#,
        );

        let request = CollectRequest {
            project: "/work/app".into(),
            summary: "Refactored the parser".into(),
            options: vec!["Continue".into(), "Stop".into()],
            ..Default::default()
        };
        let result = transport.collect(&request).await.unwrap();

        assert!(result.success);
        assert_eq!(result.content, "looks good");
        assert_eq!(result.images, vec!["a.png".to_string()]);
        assert_eq!(result.agent_id, "swift-wolf-3f2a");
        assert_eq!(result.session_id, "");

        let written: serde_json::Value = serde_json::from_str(&peer.await.unwrap()).unwrap();
        assert_eq!(written["summary"], "Refactored the parser");
        assert_eq!(written["options"], serde_json::json!(["Continue", "Stop"]));
        assert!(written["createdAt"].is_string());
        assert!(written.get("sessionId").is_none());

        assert!(dir_is_empty(transport.pending_dir()));
        assert!(dir_is_empty(transport.completed_dir()));
    }

    #[tokio::test]
    async fn test_collect_times_out() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir).with_deadline(Some(Duration::from_millis(100)));

        let started = Instant::now();
        let err = transport
            .collect(&CollectRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckpointError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(dir_is_empty(transport.pending_dir()));
    }

    #[tokio::test]
    async fn test_interrupt_cancels_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir);

        let err = transport
            .collect_until(
                &CollectRequest::default(),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckpointError::Cancelled));
        assert!(dir_is_empty(transport.pending_dir()));
    }

    #[tokio::test]
    async fn test_malformed_response_is_rejected() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir);
        let _peer = answer_with(&transport, "not json");

        let err = transport
            .collect(&CollectRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckpointError::MalformedPayload(_)));
        assert!(dir_is_empty(transport.completed_dir()));
    }

    #[test]
    fn test_stdin_request_shape() {
        let request: CollectRequest =
            serde_json::from_str(r#"{"summary":"done","sessionId":"s-1","options":["A"]}"#)
                .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
        assert_eq!(request.project, "");
    }

    #[test]
    fn test_feedback_result_wire_format() {
        let json = serde_json::to_value(FeedbackResult::unanswered()).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("sessionId").is_some());
        assert!(json.get("agentId").is_some());
    }
}
