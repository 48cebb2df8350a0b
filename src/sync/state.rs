//! Outcome, UI state and event types shared by the sync engines

use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Message shown when nothing is cached and the last refresh failed
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load data";

/// Result of one fetch-and-reconcile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshResult {
    /// The store was written
    Updated,
    /// Remote data matched the cache; nothing written
    NoChange,
    /// Fetch or write failed; cache untouched
    Failure,
}

/// Presentation state derived from the cache and the last refresh outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum UiState<T> {
    Loading,
    Success(T),
    Error(String),
}

impl<T> UiState<T> {
    /// Cached data always wins; the error state only shows over an empty cache.
    pub fn from_cache(cached: Option<T>, last_outcome: Option<RefreshResult>) -> Self {
        match cached {
            Some(value) => UiState::Success(value),
            None if last_outcome == Some(RefreshResult::Failure) => {
                UiState::Error(LOAD_ERROR_MESSAGE.to_string())
            }
            None => UiState::Loading,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, UiState::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    List,
    Detail(i64),
}

/// One-shot outcome notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEvent {
    pub subject: EventSubject,
    pub outcome: RefreshResult,
}

impl SyncEvent {
    pub fn list(outcome: RefreshResult) -> Self {
        Self {
            subject: EventSubject::List,
            outcome,
        }
    }

    pub fn detail(id: i64, outcome: RefreshResult) -> Self {
        Self {
            subject: EventSubject::Detail(id),
            outcome,
        }
    }

    pub fn message(&self) -> &'static str {
        match (self.outcome, self.subject) {
            (RefreshResult::Updated, EventSubject::List) => "List updated",
            (RefreshResult::Updated, EventSubject::Detail(_)) => "Detail updated",
            (RefreshResult::NoChange, _) => "No new updates",
            (RefreshResult::Failure, _) => "Refresh failed",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Fire-and-forget event channel. Events sent with no subscribers are lost,
/// and subscribers that fall behind the capacity miss the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers, dropped '{}'", event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

/// Single-flight flag for refresh cycles, observable through a `watch`.
#[derive(Clone)]
pub struct InFlight {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlight {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Claim the flag, or `None` if a cycle is already running.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        let acquired = self.tx.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });

        acquired.then(|| InFlightGuard {
            tx: Arc::clone(&self.tx),
        })
    }

    /// Claim the flag once the current holder releases it.
    pub async fn acquire(&self) -> InFlightGuard {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.wait_for(|busy| !*busy).await;
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Releases the in-flight flag on drop, including when the owning task is
/// aborted.
pub struct InFlightGuard {
    tx: Arc<watch::Sender<bool>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tx.send_replace(false);
    }
}

/// Send `value` only if it differs from the current one.
pub(crate) fn publish_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}
