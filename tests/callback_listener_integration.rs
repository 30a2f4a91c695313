//! Integration tests for the callback listener HTTP surface
//!
//! Run: cargo test --test callback_listener_integration

use async_trait::async_trait;
use session_helper_lib::history::{HistoryRecorder, HistoryStore};
use session_helper_lib::ipc::{start_listener, ListenerHandle, ListenerState};
use session_helper_lib::models::{AgentIdentity, AgentRegistration, Request, RequestStatus, Response};
use session_helper_lib::relay::{CorrelationTable, Resolution, WaitOutcome};
use session_helper_lib::HistoryError;
use std::sync::{Arc, Mutex};

/// In-memory store for the read endpoints.
#[derive(Default)]
struct MemoryStore {
    requests: Mutex<Vec<Request>>,
    agents: Mutex<Vec<AgentIdentity>>,
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record_request(&self, request: &Request) -> Result<(), HistoryError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn record_response(&self, response: &Response) -> Result<(), HistoryError> {
        self.update_status(&response.request_id, response.resulting_status())
            .await
    }

    async fn update_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), HistoryError> {
        for request in self.requests.lock().unwrap().iter_mut() {
            if request.request_id == request_id {
                request.transition(status);
            }
        }
        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<Request>, HistoryError> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned())
    }

    async fn recent_requests(&self, limit: u32) -> Result<Vec<Request>, HistoryError> {
        let requests = self.requests.lock().unwrap();
        Ok(requests.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, HistoryError> {
        let requests = self.requests.lock().unwrap();
        Ok(requests
            .iter()
            .rev()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn delete_request(&self, request_id: &str) -> Result<bool, HistoryError> {
        let mut requests = self.requests.lock().unwrap();
        let before = requests.len();
        requests.retain(|r| r.request_id != request_id);
        Ok(requests.len() < before)
    }

    async fn record_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentIdentity, HistoryError> {
        let agent = AgentIdentity::register(registration);
        self.agents.lock().unwrap().push(agent.clone());
        Ok(agent)
    }

    async fn find_agents(
        &self,
        hint: &str,
        limit: u32,
    ) -> Result<Vec<AgentIdentity>, HistoryError> {
        let hint = hint.to_lowercase();
        let agents = self.agents.lock().unwrap();
        Ok(agents
            .iter()
            .rev()
            .filter(|a| {
                a.context
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&hint))
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn recent_agents(&self, limit: u32) -> Result<Vec<AgentIdentity>, HistoryError> {
        let agents = self.agents.lock().unwrap();
        Ok(agents.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn touch_agent(
        &self,
        agent_id: &str,
        context: Option<&str>,
    ) -> Result<Option<AgentIdentity>, HistoryError> {
        let mut agents = self.agents.lock().unwrap();
        Ok(agents
            .iter_mut()
            .find(|a| a.agent_id == agent_id)
            .map(|a| {
                a.touch(context);
                a.clone()
            }))
    }
}

async fn listener_with(history: HistoryRecorder) -> (ListenerHandle, CorrelationTable, String) {
    let table = CorrelationTable::new();
    let handle = start_listener(
        ListenerState {
            table: table.clone(),
            history,
        },
        0,
        1,
    )
    .await
    .unwrap();
    let base = format!("http://127.0.0.1:{}", handle.port());
    (handle, table, base)
}

/// Loopback client that ignores proxy settings
fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn post_json(url: &str, body: &str) -> (u16, serde_json::Value) {
    let response = client()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or_default())
}

async fn get_json(url: &str) -> (u16, serde_json::Value) {
    let response = client().get(url).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or_default())
}

// ============================================================================
// POST /response
// ============================================================================

#[tokio::test]
async fn test_resolution_wakes_waiter_once() {
    let (_handle, table, base) = listener_with(HistoryRecorder::disabled()).await;
    let mut entry = table.register("req-1").unwrap();

    let body = r#"{"requestId":"req-1","userInput":"ship it"}"#;
    let (status, ack) = post_json(&format!("{}/response", base), body).await;
    assert_eq!(status, 200);
    assert_eq!(ack, serde_json::json!({ "success": true }));

    assert_eq!(
        entry.wait(None).await,
        WaitOutcome::Resolved(Resolution::Answered("ship it".to_string()))
    );

    // Second delivery of the same answer
    let (status, ack) = post_json(&format!("{}/response", base), body).await;
    assert_eq!(status, 404);
    assert_eq!(ack["error"], "Request not found");
}

#[tokio::test]
async fn test_cancellation_flag() {
    let (_handle, table, base) = listener_with(HistoryRecorder::disabled()).await;
    let mut entry = table.register("req-1").unwrap();

    let (status, _) = post_json(
        &format!("{}/response", base),
        r#"{"requestId":"req-1","userInput":"","cancelled":true}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(entry.wait(None).await, WaitOutcome::Resolved(Resolution::Cancelled));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let (_handle, _table, base) = listener_with(HistoryRecorder::disabled()).await;

    let (status, ack) = post_json(
        &format!("{}/response", base),
        r#"{"requestId":"nobody","userInput":"hi"}"#,
    )
    .await;

    assert_eq!(status, 404);
    assert_eq!(ack["success"], false);
}

#[tokio::test]
async fn test_malformed_payload_leaves_other_entries_alone() {
    let (_handle, table, base) = listener_with(HistoryRecorder::disabled()).await;
    let _entry = table.register("req-1").unwrap();

    for body in ["not json", r#"{"userInput":"missing id"}"#, r#"{"requestId":42}"#] {
        let (status, ack) = post_json(&format!("{}/response", base), body).await;
        assert_eq!(status, 400, "body: {}", body);
        assert_eq!(ack["success"], false);
    }

    assert!(table.contains("req-1"));
}

// ============================================================================
// GET endpoints
// ============================================================================

#[tokio::test]
async fn test_health_reports_pending_count() {
    let (_handle, table, base) = listener_with(HistoryRecorder::disabled()).await;
    let _a = table.register("a").unwrap();
    let _b = table.register("b").unwrap();

    let (status, body) = get_json(&format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending"], 2);
}

#[tokio::test]
async fn test_read_endpoints_without_store() {
    let (_handle, _table, base) = listener_with(HistoryRecorder::disabled()).await;

    for path in ["history", "pending", "agents"] {
        let (status, body) = get_json(&format!("{}/{}", base, path)).await;
        assert_eq!(status, 501, "path: {}", path);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_history_and_pending_listings() {
    let store = Arc::new(MemoryStore::default());
    let long = Request::new("x".repeat(250), vec![]);
    let paused = Request::new("paused", vec!["Continue".into()]).with_pause(true);
    store.record_request(&long).await.unwrap();
    store.record_request(&paused).await.unwrap();
    store
        .update_status(&long.request_id, RequestStatus::Completed)
        .await
        .unwrap();

    let (_handle, _table, base) = listener_with(HistoryRecorder::new(store)).await;

    let (status, body) = get_json(&format!("{}/history", base)).await;
    assert_eq!(status, 200);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["request_id"], long.request_id.as_str());
    assert_eq!(history[1]["prompt"].as_str().unwrap().len(), 100);
    assert_eq!(history[1]["status"], "COMPLETED");

    let (status, body) = get_json(&format!("{}/pending", base)).await;
    assert_eq!(status, 200);
    let pending = body["pending"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["is_pause"], true);
}

#[tokio::test]
async fn test_agents_listing() {
    let store = Arc::new(MemoryStore::default());
    store
        .record_agent(AgentRegistration {
            context: Some("docs".into()),
            model: Some("sonnet".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let (_handle, _table, base) = listener_with(HistoryRecorder::new(store)).await;

    let (status, body) = get_json(&format!("{}/agents", base)).await;
    assert_eq!(status, 200);
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["context"], "docs");
    assert!(agents[0]["last_activity"].is_string());
}

#[tokio::test]
async fn test_unknown_path() {
    let (_handle, _table, base) = listener_with(HistoryRecorder::disabled()).await;

    let (status, body) = get_json(&format!("{}/nope", base)).await;
    assert_eq!(status, 404);
    assert_eq!(body, serde_json::json!({ "error": "Not found" }));
}

#[tokio::test]
async fn test_cors_preflight() {
    let (_handle, _table, base) = listener_with(HistoryRecorder::disabled()).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, format!("{}/response", base))
        .header("Origin", "vscode-webview://panel")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

// ============================================================================
// DELETE /session/{request_id}
// ============================================================================

async fn delete(url: &str) -> (u16, serde_json::Value) {
    let response = client().delete(url).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or_default())
}

#[tokio::test]
async fn test_delete_session_cancels_waiter_and_drops_history() {
    let store = Arc::new(MemoryStore::default());
    let request = Request::new("waiting", vec![]);
    store.record_request(&request).await.unwrap();

    let (_handle, table, base) = listener_with(HistoryRecorder::new(store.clone())).await;
    let mut entry = table.register(&request.request_id).unwrap();

    let url = format!("{}/session/{}", base, request.request_id);
    let (status, body) = delete(&url).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["request_id"], request.request_id.as_str());

    assert_eq!(entry.wait(None).await, WaitOutcome::Resolved(Resolution::Cancelled));
    assert!(store.get_request(&request.request_id).await.unwrap().is_none());

    let (status, body) = delete(&url).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Request not found");
}

#[tokio::test]
async fn test_delete_session_without_store() {
    let (_handle, _table, base) = listener_with(HistoryRecorder::disabled()).await;

    let (status, body) = delete(&format!("{}/session/req-1", base)).await;
    assert_eq!(status, 501);
    assert!(body["error"].is_string());
}
