//! Ranked list synchronization
//!
//! A refresh fetches one remote page, diffs it against the cached list on
//! the fields the list displays, and replaces the cached list atomically
//! when anything differs.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mapping::map_list;
use super::state::{publish_if_changed, EventBus, InFlight, RefreshResult, SyncEvent, UiState};
use super::{SyncConfig, SyncSession};
use crate::client::AnimeApi;
use crate::network::ConnectivityMonitor;
use crate::store::{now_millis, ListItem, LocalStore};

/// Why a fetched page does or does not replace the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    SizeChanged { cached: usize, fetched: usize },
    IdsChanged,
    /// First id whose displayed fields changed
    ContentChanged(i64),
    Unchanged,
}

impl ListChange {
    pub fn requires_write(&self) -> bool {
        !matches!(self, ListChange::Unchanged)
    }
}

/// Compare a cached list with a freshly fetched one.
pub fn diff_list(cached: &[ListItem], fetched: &[ListItem]) -> ListChange {
    if cached.len() != fetched.len() {
        return ListChange::SizeChanged {
            cached: cached.len(),
            fetched: fetched.len(),
        };
    }

    let by_id: HashMap<i64, &ListItem> = cached.iter().map(|item| (item.id, item)).collect();
    if fetched.iter().any(|item| !by_id.contains_key(&item.id)) {
        return ListChange::IdsChanged;
    }

    for item in fetched {
        if let Some(old) = by_id.get(&item.id) {
            if old.differs_from(item) {
                return ListChange::ContentChanged(item.id);
            }
        }
    }

    ListChange::Unchanged
}

struct ListInner {
    api: Arc<dyn AnimeApi>,
    store: Arc<LocalStore>,
    monitor: Option<ConnectivityMonitor>,
    config: SyncConfig,
    events: EventBus,
    in_flight: InFlight,
    last_outcome: watch::Sender<Option<RefreshResult>>,
    ui_state: watch::Sender<UiState<Vec<ListItem>>>,
}

impl ListInner {
    async fn reconcile(&self, page: u32) -> RefreshResult {
        let response = match self.api.top_anime(page).await {
            Ok(response) => response,
            Err(e) => {
                warn!("List refresh failed: {}", e);
                return RefreshResult::Failure;
            }
        };

        if let Some(pagination) = &response.pagination {
            debug!(
                "Fetched page {} (last visible page: {:?}, has next: {:?})",
                page, pagination.last_visible_page, pagination.has_next_page
            );
        }

        let fetched = map_list(response.data, now_millis());

        let cached = match self.store.list_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Failed to read cached list, treating as empty: {}", e);
                Vec::new()
            }
        };

        let change = diff_list(&cached, &fetched);
        if !change.requires_write() {
            debug!("List unchanged ({} items)", fetched.len());
            return RefreshResult::NoChange;
        }

        debug!("List changed: {:?}", change);
        match self.store.replace_list(&fetched).await {
            Ok(()) => {
                info!("Cached list replaced with {} items", fetched.len());
                RefreshResult::Updated
            }
            Err(e) => {
                error!("Failed to write list: {}", e);
                RefreshResult::Failure
            }
        }
    }
}

/// Keeps the cached ranked list in sync with the remote catalog.
#[derive(Clone)]
pub struct ListSyncEngine {
    inner: Arc<ListInner>,
}

impl ListSyncEngine {
    pub fn new(
        api: Arc<dyn AnimeApi>,
        store: Arc<LocalStore>,
        monitor: Option<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        let (last_outcome, _) = watch::channel(None);
        let (ui_state, _) = watch::channel(UiState::Loading);

        Self {
            inner: Arc::new(ListInner {
                api,
                store,
                monitor,
                events: EventBus::new(config.event_capacity),
                config,
                in_flight: InFlight::new(),
                last_outcome,
                ui_state,
            }),
        }
    }

    /// Live cached list, highest score first. Replays the current contents.
    pub fn observe(&self) -> impl Stream<Item = Vec<ListItem>> + Send + 'static {
        self.inner.store.observe_list()
    }

    /// Fetch `page` and reconcile. Returns `None` without fetching when a
    /// refresh is already running.
    pub async fn refresh(&self, page: u32) -> Option<RefreshResult> {
        let Some(_guard) = self.inner.in_flight.try_acquire() else {
            debug!("List refresh already in flight, skipping");
            return None;
        };

        let result = self.inner.reconcile(page).await;
        self.inner.last_outcome.send_replace(Some(result));
        self.inner.events.publish(SyncEvent::list(result));
        Some(result)
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn ui_state(&self) -> watch::Receiver<UiState<Vec<ListItem>>> {
        self.inner.ui_state.subscribe()
    }

    pub fn last_outcome(&self) -> Option<RefreshResult> {
        *self.inner.last_outcome.borrow()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.is_busy()
    }

    pub fn refreshing(&self) -> watch::Receiver<bool> {
        self.inner.in_flight.subscribe()
    }

    /// Start the background tasks: UI state derivation, a cold-start
    /// refresh when the cache is empty, and re-sync on reconnect.
    pub async fn start(&self) -> SyncSession {
        let mut tasks = vec![self.spawn_ui_state(), self.spawn_cold_start()];
        if let Some(task) = self.spawn_connectivity() {
            tasks.push(task);
        }
        SyncSession::new(tasks)
    }

    fn spawn_ui_state(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let stream = inner.store.observe_list();
        let mut outcomes = inner.last_outcome.subscribe();

        tokio::spawn(async move {
            tokio::pin!(stream);
            let mut items: Option<Vec<ListItem>> = None;

            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(latest) => items = Some(latest),
                        None => break,
                    },
                    changed = outcomes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                if let Some(items) = &items {
                    let last = *outcomes.borrow_and_update();
                    let cached = (!items.is_empty()).then(|| items.clone());
                    publish_if_changed(&inner.ui_state, UiState::from_cache(cached, last));
                }
            }
        })
    }

    fn spawn_cold_start(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let empty = match engine.inner.store.list_items().await {
                Ok(items) => items.is_empty(),
                Err(e) => {
                    warn!("Failed to read cached list: {}", e);
                    true
                }
            };

            if empty {
                info!("List cache empty, fetching first page");
                engine.refresh(engine.inner.config.default_page).await;
            } else {
                debug!("List cache warm, skipping cold-start refresh");
            }
        })
    }

    fn spawn_connectivity(&self) -> Option<JoinHandle<()>> {
        let monitor = self.inner.monitor.as_ref()?;
        // Subscribe before spawning so no transition is missed.
        let mut subscription = monitor.subscribe();
        let engine = self.clone();

        Some(tokio::spawn(async move {
            // The first value replays the state at subscription time.
            if subscription.next().await.is_none() {
                return;
            }

            while let Some(status) = subscription.next().await {
                if status.is_available() {
                    info!("Network available, refreshing list");
                    engine.refresh(engine.inner.config.default_page).await;
                } else {
                    debug!("Network lost");
                }
            }
        }))
    }
}
