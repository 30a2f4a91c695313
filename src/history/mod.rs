//! Request history and agent identity persistence
//!
//! The relay never depends on this store for correctness. Lifecycle writes go
//! through [`HistoryRecorder`], which bounds each call and logs-and-drops any
//! failure. Identity operations (`join`/`recall`) surface errors to the caller
//! because they have no other outcome to report.

mod sqlite;

pub use sqlite::SqliteHistoryStore;

use crate::error::HistoryError;
use crate::models::{AgentIdentity, AgentRegistration, Request, RequestStatus, Response};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single best-effort store call
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Storage backend for request lifecycle and agent identities.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a newly created request.
    async fn record_request(&self, request: &Request) -> Result<(), HistoryError>;

    /// Insert the response and move the request to COMPLETED/CANCELLED.
    /// A second response for the same request is ignored.
    async fn record_response(&self, response: &Response) -> Result<(), HistoryError>;

    /// Move a PENDING request to `status`. Terminal requests are left unchanged.
    async fn update_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), HistoryError>;

    async fn get_request(&self, request_id: &str) -> Result<Option<Request>, HistoryError>;

    /// Most recent requests first.
    async fn recent_requests(&self, limit: u32) -> Result<Vec<Request>, HistoryError>;

    /// Requests still PENDING, most recent first.
    async fn pending_requests(&self) -> Result<Vec<Request>, HistoryError>;

    /// Remove a request and its response. Returns false if the id is unknown.
    async fn delete_request(&self, request_id: &str) -> Result<bool, HistoryError>;

    /// Create an identity with a generated friendly id.
    async fn record_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentIdentity, HistoryError>;

    /// Identities whose context contains `hint` (case-insensitive), most recently active first.
    async fn find_agents(&self, hint: &str, limit: u32)
        -> Result<Vec<AgentIdentity>, HistoryError>;

    /// All identities, most recently active first.
    async fn recent_agents(&self, limit: u32) -> Result<Vec<AgentIdentity>, HistoryError>;

    /// Bump `last_activity` (and optionally replace the context).
    async fn touch_agent(
        &self,
        agent_id: &str,
        context: Option<&str>,
    ) -> Result<Option<AgentIdentity>, HistoryError>;
}

/// Shared handle to an optional history store.
#[derive(Clone, Default)]
pub struct HistoryRecorder {
    store: Option<Arc<dyn HistoryStore>>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// The underlying store, or `HistoryError::Disabled`.
    pub fn store(&self) -> Result<&Arc<dyn HistoryStore>, HistoryError> {
        self.store.as_ref().ok_or(HistoryError::Disabled)
    }

    pub async fn record_request_created(&self, request: &Request) {
        if let Some(store) = &self.store {
            best_effort("record request", store.record_request(request)).await;
        }
    }

    pub async fn record_response(&self, response: &Response) {
        if let Some(store) = &self.store {
            best_effort("record response", store.record_response(response)).await;
        }
    }

    pub async fn record_status(&self, request_id: &str, status: RequestStatus) {
        if let Some(store) = &self.store {
            best_effort("update status", store.update_status(request_id, status)).await;
        }
    }

    /// Register an identity. Errors are returned to the caller.
    pub async fn record_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentIdentity, HistoryError> {
        self.store()?.record_agent(registration).await
    }

    /// Bump an identity's activity. `Ok(None)` when the id is unknown.
    pub async fn touch_agent(
        &self,
        agent_id: &str,
        context: Option<&str>,
    ) -> Result<Option<AgentIdentity>, HistoryError> {
        self.store()?.touch_agent(agent_id, context).await
    }

    /// Find identities by context hint; a blank hint lists the most recent ones.
    pub async fn find_agents(&self, hint: Option<&str>) -> Result<Vec<AgentIdentity>, HistoryError> {
        let store = self.store()?;
        match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => store.find_agents(hint, 5).await,
            None => store.recent_agents(10).await,
        }
    }
}

async fn best_effort<F>(what: &str, call: F)
where
    F: Future<Output = Result<(), HistoryError>>,
{
    match tokio::time::timeout(STORE_CALL_TIMEOUT, call).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("History store: failed to {}: {}", what, e),
        Err(_) => log::warn!("History store: {} ({})", HistoryError::TimedOut, what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose every call fails.
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for FailingStore {
        async fn record_request(&self, _: &Request) -> Result<(), HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn record_response(&self, _: &Response) -> Result<(), HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn update_status(&self, _: &str, _: RequestStatus) -> Result<(), HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn get_request(&self, _: &str) -> Result<Option<Request>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn recent_requests(&self, _: u32) -> Result<Vec<Request>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn pending_requests(&self) -> Result<Vec<Request>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn delete_request(&self, _: &str) -> Result<bool, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn record_agent(&self, _: AgentRegistration) -> Result<AgentIdentity, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn find_agents(&self, _: &str, _: u32) -> Result<Vec<AgentIdentity>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn recent_agents(&self, _: u32) -> Result<Vec<AgentIdentity>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn touch_agent(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<Option<AgentIdentity>, HistoryError> {
            Err(HistoryError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_recorder_suppresses_store_failures() {
        let store = Arc::new(FailingStore {
            calls: AtomicUsize::new(0),
        });
        let recorder = HistoryRecorder::new(store.clone());
        let request = Request::new("p", vec![]);

        recorder.record_request_created(&request).await;
        recorder
            .record_response(&Response::new(&request.request_id, "ok", false))
            .await;
        recorder
            .record_status(&request.request_id, RequestStatus::Timeout)
            .await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_identity_errors_are_surfaced() {
        let recorder = HistoryRecorder::new(Arc::new(FailingStore {
            calls: AtomicUsize::new(0),
        }));
        assert!(recorder
            .record_agent(AgentRegistration::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_recorder() {
        let recorder = HistoryRecorder::disabled();
        assert!(!recorder.is_enabled());
        recorder
            .record_request_created(&Request::new("p", vec![]))
            .await;
        assert!(matches!(
            recorder.find_agents(None).await,
            Err(HistoryError::Disabled)
        ));
    }
}
