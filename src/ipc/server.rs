//! Callback Listener
//!
//! HTTP endpoint the peer posts answers to. It runs on its own OS thread with
//! a current-thread tokio runtime, so an incoming answer never waits behind
//! MCP request handling on the main runtime.
//!
//! ## Routes
//!
//! ```text
//! POST /response  - resolve a pending request
//! GET  /health    - liveness + number of outstanding requests
//! GET  /history   - 20 most recent requests (history store)
//! GET  /pending   - requests still PENDING (history store)
//! GET  /agents    - 50 most recently active identities (history store)
//! DELETE /session/{request_id} - drop a request from history, cancelling its waiter
//! ```

use crate::error::HistoryError;
use crate::history::HistoryRecorder;
use crate::ipc::protocol::{Ack, ResolutionPayload, RESPONSE_PATH};
use crate::models::{AgentIdentity, Request};
use crate::relay::{CorrelationTable, Resolution};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

/// Prompts in listings are cut to this many characters
const PROMPT_PREVIEW_CHARS: usize = 100;
const HISTORY_LIMIT: u32 = 20;
const AGENTS_LIMIT: u32 = 50;

/// Listener shared state
#[derive(Clone)]
pub struct ListenerState {
    pub table: CorrelationTable,
    pub history: HistoryRecorder,
}

/// Running listener. Dropping it stops the server.
pub struct ListenerHandle {
    port: u16,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Port the listener is bound to (reported to peers as `callbackPort`).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting, drain in-flight requests and join the listener thread.
    /// Requests still waiting on the correlation table are abandoned.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Callback listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the listener routes.
pub fn router(state: ListenerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(RESPONSE_PATH, post(response_handler))
        .route("/health", get(health_handler))
        .route("/history", get(history_handler))
        .route("/pending", get(pending_handler))
        .route("/agents", get(agents_handler))
        .route("/session/{request_id}", delete(delete_session_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .with_state(state)
}

/// Start the listener on a dedicated thread.
///
/// Binds the first free port in `[start_port, start_port + attempts)` on
/// 127.0.0.1, or an OS-assigned port when `start_port` is 0. Returns once the
/// socket is bound, or with the bind error.
pub async fn start_listener(
    state: ListenerState,
    start_port: u16,
    attempts: u16,
) -> Result<ListenerHandle, String> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<u16, String>>();
    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();

    let thread = std::thread::Builder::new()
        .name("callback-listener".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("Failed to build listener runtime: {}", e)));
                    return;
                }
            };

            runtime.block_on(serve(state, start_port, attempts, ready_tx, server_shutdown));
        })
        .map_err(|e| format!("Failed to spawn listener thread: {}", e))?;

    let mut handle = ListenerHandle {
        port: 0,
        shutdown,
        thread: Some(thread),
    };

    match ready_rx.await {
        Ok(Ok(port)) => {
            handle.port = port;
            Ok(handle)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err("Callback listener exited during startup".to_string()),
    }
}

async fn serve(
    state: ListenerState,
    start_port: u16,
    attempts: u16,
    ready_tx: oneshot::Sender<Result<u16, String>>,
    shutdown: CancellationToken,
) {
    let listener = match bind_first_free(start_port, attempts).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Failed to read listener address: {}", e)));
            return;
        }
    };

    log::info!("Callback listener on http://127.0.0.1:{}", port);
    let _ = ready_tx.send(Ok(port));

    let table = state.table.clone();
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        log::error!("Callback listener error: {}", e);
    }

    // Nothing can resolve the remaining entries any more
    if !table.is_empty() {
        log::warn!("Abandoning {} pending request(s)", table.len());
    }
    table.clear();
    log::info!("Callback listener stopped");
}

async fn bind_first_free(start_port: u16, attempts: u16) -> Result<TcpListener, String> {
    if start_port == 0 {
        return TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .map_err(|e| format!("Failed to bind callback listener: {}", e));
    }

    let mut last_error = None;
    for offset in 0..attempts.max(1) {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                log::debug!("Callback port {} unavailable: {}", port, e);
                last_error = Some(e);
            }
        }
    }

    Err(format!(
        "No free callback port in {}..{}{}",
        start_port,
        start_port.saturating_add(attempts),
        last_error.map(|e| format!(": {}", e)).unwrap_or_default()
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /response
async fn response_handler(
    State(state): State<ListenerState>,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    let payload: ResolutionPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Rejected malformed resolution payload: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(Ack::error(format!("Malformed payload: {}", e))),
            );
        }
    };

    let resolution = if payload.cancelled {
        Resolution::Cancelled
    } else {
        Resolution::Answered(payload.user_input)
    };

    if state.table.resolve(&payload.request_id, resolution) {
        log::info!("Resolved request {}", payload.request_id);
        (StatusCode::OK, Json(Ack::ok()))
    } else {
        log::debug!("No pending request {}", payload.request_id);
        (StatusCode::NOT_FOUND, Json(Ack::error("Request not found")))
    }
}

/// GET /health
async fn health_handler(State(state): State<ListenerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "session-helper",
        "version": env!("CARGO_PKG_VERSION"),
        "pending": state.table.len(),
    }))
}

/// GET /history
async fn history_handler(State(state): State<ListenerState>) -> (StatusCode, Json<serde_json::Value>) {
    let result = match state.history.store() {
        Ok(store) => store.recent_requests(HISTORY_LIMIT).await,
        Err(e) => Err(e),
    };
    listing("history", result, |r: Request| {
        json!({
            "request_id": r.request_id,
            "prompt": preview(&r.prompt),
            "status": r.status,
            "created_at": r.created_at,
        })
    })
}

/// GET /pending
async fn pending_handler(State(state): State<ListenerState>) -> (StatusCode, Json<serde_json::Value>) {
    let result = match state.history.store() {
        Ok(store) => store.pending_requests().await,
        Err(e) => Err(e),
    };
    listing("pending", result, |r: Request| {
        json!({
            "request_id": r.request_id,
            "prompt": preview(&r.prompt),
            "is_pause": r.is_pause,
            "created_at": r.created_at,
        })
    })
}

/// GET /agents
async fn agents_handler(State(state): State<ListenerState>) -> (StatusCode, Json<serde_json::Value>) {
    let result = match state.history.store() {
        Ok(store) => store.recent_agents(AGENTS_LIMIT).await,
        Err(e) => Err(e),
    };
    listing("agents", result, |a: AgentIdentity| json!(a))
}

/// DELETE /session/{request_id}
async fn delete_session_handler(
    State(state): State<ListenerState>,
    Path(request_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let store = match state.history.store() {
        Ok(store) => store,
        Err(e) => {
            return (
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    match store.delete_request(&request_id).await {
        Ok(true) => {
            if state.table.resolve(&request_id, Resolution::Cancelled) {
                log::info!("Cancelled pending request {} on delete", request_id);
            }
            (
                StatusCode::OK,
                Json(json!({ "status": "deleted", "request_id": request_id })),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Request not found" })),
        ),
        Err(e) => {
            log::warn!("Failed to delete request {}: {}", request_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Wrap a store listing as `{ <key>: [...] }`, mapping store errors to 501/500.
fn listing<T>(
    key: &str,
    result: Result<Vec<T>, HistoryError>,
    render: impl Fn(T) -> serde_json::Value,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(items) => {
            let items: Vec<serde_json::Value> = items.into_iter().map(render).collect();
            (StatusCode::OK, Json(json!({ key: items })))
        }
        Err(HistoryError::Disabled) => (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({ "error": HistoryError::Disabled.to_string() })),
        ),
        Err(e) => {
            log::warn!("History listing '{}' failed: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

fn preview(prompt: &str) -> String {
    prompt.chars().take(PROMPT_PREVIEW_CHARS).collect()
}
