//! Correlation Table
//!
//! Thread-safe map of outstanding request ids to the one-shot channel that
//! wakes the suspended dispatcher. The dispatcher creates and withdraws
//! entries; the callback listener (on its own thread) resolves them. Every
//! path goes through `DashMap::remove`, so for a given id exactly one of
//! {resolve, timeout withdrawal, scan-failure withdrawal} observes the entry;
//! all later attempts see it gone and report "not found".

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// How an outstanding request was resolved by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Answered(String),
    Cancelled,
}

/// Result of waiting on a [`PendingEntry`].
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Resolved(Resolution),
    /// The deadline elapsed and this waiter withdrew the entry.
    TimedOut,
    /// The entry was dropped without a resolution (table cleared).
    Abandoned,
}

/// Shared request-id → suspension-handle map.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<DashMap<String, oneshot::Sender<Resolution>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Insert a new entry. Returns `None` if the id is already outstanding.
    pub fn register(&self, request_id: &str) -> Option<PendingEntry> {
        match self.pending.entry(request_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Some(PendingEntry {
                    request_id: request_id.to_string(),
                    table: self.clone(),
                    receiver: rx,
                })
            }
        }
    }

    /// Remove the entry and wake its waiter.
    ///
    /// Returns false if the id is unknown or already resolved/withdrawn.
    pub fn resolve(&self, request_id: &str, resolution: Resolution) -> bool {
        match self.pending.remove(request_id) {
            Some((_, tx)) => {
                if tx.send(resolution).is_err() {
                    log::debug!("Waiter for {} is gone, resolution dropped", request_id);
                }
                true
            }
            None => false,
        }
    }

    /// Remove the entry without resolving it. Returns false if already gone.
    pub fn withdraw(&self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every entry; their waiters observe [`WaitOutcome::Abandoned`].
    pub fn clear(&self) {
        self.pending.clear();
    }
}

/// Suspension handle held by the dispatcher for one outstanding request.
///
/// Dropping the handle withdraws the entry if it is still present, so a
/// caller that gives up (e.g. an aborted tool call) never leaks it.
pub struct PendingEntry {
    request_id: String,
    table: CorrelationTable,
    receiver: oneshot::Receiver<Resolution>,
}

impl PendingEntry {
    /// Withdraw the entry (scan failure). Returns false if it was already resolved.
    pub fn withdraw(&self) -> bool {
        self.table.withdraw(&self.request_id)
    }

    /// Wait for the resolution, racing it against `deadline` if one is given.
    pub async fn wait(&mut self, deadline: Option<Duration>) -> WaitOutcome {
        let Some(deadline) = deadline else {
            return Self::outcome((&mut self.receiver).await);
        };

        match tokio::time::timeout(deadline, &mut self.receiver).await {
            Ok(received) => Self::outcome(received),
            Err(_) => {
                if self.table.withdraw(&self.request_id) {
                    WaitOutcome::TimedOut
                } else {
                    // The listener removed the entry first; its send is already in flight.
                    Self::outcome((&mut self.receiver).await)
                }
            }
        }
    }

    fn outcome(received: Result<Resolution, oneshot::error::RecvError>) -> WaitOutcome {
        match received {
            Ok(resolution) => WaitOutcome::Resolved(resolution),
            Err(_) => WaitOutcome::Abandoned,
        }
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        self.table.withdraw(&self.request_id);
    }
}
