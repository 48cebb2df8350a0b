//! Per-id detail synchronization
//!
//! The engine is bound to one id at a time through [`DetailSyncEngine::load`].
//! A binding owns a store observer, one refresh and, when a monitor is
//! configured, a connectivity re-sync task. Rebinding aborts all three, and
//! outcomes of a superseded binding are never published.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mapping::map_detail;
use super::state::{
    publish_if_changed, EventBus, InFlight, InFlightGuard, RefreshResult, SyncEvent, UiState,
};
use super::{SyncConfig, SyncSession};
use crate::client::AnimeApi;
use crate::network::ConnectivityMonitor;
use crate::store::{now_millis, DetailRecord, LocalStore};

struct Binding {
    id: i64,
    session: SyncSession,
}

struct DetailInner {
    api: Arc<dyn AnimeApi>,
    store: Arc<LocalStore>,
    monitor: Option<ConnectivityMonitor>,
    events: EventBus,
    in_flight: InFlight,
    /// Generation of the current binding; bumped by every `load`
    generation: Mutex<u64>,
    last_outcome: watch::Sender<Option<RefreshResult>>,
    ui_state: watch::Sender<UiState<DetailRecord>>,
}

impl DetailInner {
    async fn reconcile(&self, id: i64) -> RefreshResult {
        let response = match self.api.anime_detail(id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Detail refresh for {} failed: {}", id, e);
                return RefreshResult::Failure;
            }
        };

        let fetched = map_detail(id, response.data, now_millis());

        let cached = match self.store.detail(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to read cached detail {}, treating as absent: {}", id, e);
                None
            }
        };

        if cached.is_some_and(|cached| cached.same_content(&fetched)) {
            debug!("Detail {} unchanged", id);
            return RefreshResult::NoChange;
        }

        match self.store.upsert_detail(&fetched).await {
            Ok(()) => {
                info!("Cached detail {} updated", id);
                RefreshResult::Updated
            }
            Err(e) => {
                error!("Failed to write detail {}: {}", id, e);
                RefreshResult::Failure
            }
        }
    }

    /// Run one refresh on behalf of binding `generation`.
    async fn bound_refresh(&self, id: i64, generation: u64, guard: InFlightGuard) {
        let result = self.reconcile(id).await;
        drop(guard);

        let current = self.generation.lock();
        if *current != generation {
            debug!("Discarding outcome of superseded detail {}", id);
            return;
        }
        self.last_outcome.send_replace(Some(result));
        self.events.publish(SyncEvent::detail(id, result));
    }

    fn publish_state(&self, generation: u64, state: UiState<DetailRecord>) {
        let current = self.generation.lock();
        if *current == generation {
            publish_if_changed(&self.ui_state, state);
        }
    }
}

/// Keeps one cached detail record in sync with the remote catalog.
pub struct DetailSyncEngine {
    inner: Arc<DetailInner>,
    binding: Mutex<Option<Binding>>,
}

impl DetailSyncEngine {
    pub fn new(
        api: Arc<dyn AnimeApi>,
        store: Arc<LocalStore>,
        monitor: Option<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        let (last_outcome, _) = watch::channel(None);
        let (ui_state, _) = watch::channel(UiState::Loading);

        Self {
            inner: Arc::new(DetailInner {
                api,
                store,
                monitor,
                events: EventBus::new(config.event_capacity),
                in_flight: InFlight::new(),
                generation: Mutex::new(0),
                last_outcome,
                ui_state,
            }),
            binding: Mutex::new(None),
        }
    }

    /// Live cached record for `id`; `None` while it is not cached.
    pub fn observe(&self, id: i64) -> impl Stream<Item = Option<DetailRecord>> + Send + 'static {
        self.inner.store.observe_detail(id)
    }

    /// Read the cached record once. Read failures are reported as absent.
    pub async fn get_once(&self, id: i64) -> Option<DetailRecord> {
        match self.inner.store.detail(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to read cached detail {}: {}", id, e);
                None
            }
        }
    }

    /// Fetch `id` and reconcile. Returns `None` without fetching when a
    /// refresh is already running.
    pub async fn refresh(&self, id: i64) -> Option<RefreshResult> {
        let Some(_guard) = self.inner.in_flight.try_acquire() else {
            debug!("Detail refresh already in flight, skipping {}", id);
            return None;
        };

        let result = self.inner.reconcile(id).await;
        if self.current_id() == Some(id) {
            self.inner.last_outcome.send_replace(Some(result));
        }
        self.inner.events.publish(SyncEvent::detail(id, result));
        Some(result)
    }

    /// Bind the engine to `id`: observe its cached record, refresh it once,
    /// and re-sync it on reconnect. Replaces any previous binding.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn load(&self, id: i64) {
        let mut binding = self.binding.lock();

        if let Some(current) = binding.as_ref() {
            if current.id == id && current.session.is_active() {
                debug!("Detail {} already loaded", id);
                return;
            }
        }

        // Invalidate the old binding's outcomes before its tasks are torn down.
        let generation = {
            let mut current = self.inner.generation.lock();
            *current += 1;
            *current
        };

        // Aborts the previous binding's tasks.
        if let Some(previous) = binding.take() {
            debug!("Unbinding detail {}", previous.id);
        }
        self.inner.last_outcome.send_replace(None);
        self.inner.ui_state.send_replace(UiState::Loading);

        let mut tasks = vec![self.spawn_state(id, generation), self.spawn_refresh(id, generation)];
        if let Some(task) = self.spawn_connectivity(id, generation) {
            tasks.push(task);
        }

        info!("Loading detail {}", id);
        *binding = Some(Binding {
            id,
            session: SyncSession::new(tasks),
        });
    }

    /// Drop the current binding, stopping its background tasks.
    pub fn unload(&self) {
        if let Some(previous) = self.binding.lock().take() {
            debug!("Unbinding detail {}", previous.id);
        }
    }

    /// Id of the current binding
    pub fn current_id(&self) -> Option<i64> {
        self.binding.lock().as_ref().map(|binding| binding.id)
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn ui_state(&self) -> watch::Receiver<UiState<DetailRecord>> {
        self.inner.ui_state.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.is_busy()
    }

    pub fn refreshing(&self) -> watch::Receiver<bool> {
        self.inner.in_flight.subscribe()
    }

    fn spawn_state(&self, id: i64, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let stream = inner.store.observe_detail(id);
        let mut outcomes = inner.last_outcome.subscribe();

        tokio::spawn(async move {
            tokio::pin!(stream);
            let mut record: Option<Option<DetailRecord>> = None;

            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(latest) => record = Some(latest),
                        None => break,
                    },
                    changed = outcomes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                if let Some(record) = &record {
                    let last = *outcomes.borrow_and_update();
                    inner.publish_state(generation, UiState::from_cache(record.clone(), last));
                }
            }
        })
    }

    fn spawn_refresh(&self, id: i64, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Waits out a refresh of the previous binding that is still
            // being torn down.
            let guard = inner.in_flight.acquire().await;
            inner.bound_refresh(id, generation, guard).await;
        })
    }

    fn spawn_connectivity(&self, id: i64, generation: u64) -> Option<JoinHandle<()>> {
        let monitor = self.inner.monitor.as_ref()?;
        let mut subscription = monitor.subscribe();
        let inner = Arc::clone(&self.inner);

        Some(tokio::spawn(async move {
            // Skip the replayed state; `load` already refreshes once.
            if subscription.next().await.is_none() {
                return;
            }

            while let Some(status) = subscription.next().await {
                if !status.is_available() {
                    continue;
                }
                match inner.in_flight.try_acquire() {
                    Some(guard) => {
                        info!("Network available, refreshing detail {}", id);
                        inner.bound_refresh(id, generation, guard).await;
                    }
                    None => debug!("Detail refresh already in flight, skipping {}", id),
                }
            }
        }))
    }
}

impl Drop for DetailSyncEngine {
    fn drop(&mut self) {
        self.binding.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::{AnimeDetailResponse, AnimeDto, TopAnimeResponse};
    use crate::error::ApiError;
    use crate::sync::state::EventSubject;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticApi;

    #[async_trait]
    impl AnimeApi for StaticApi {
        async fn top_anime(&self, _page: u32) -> Result<TopAnimeResponse, ApiError> {
            Ok(TopAnimeResponse::default())
        }

        async fn anime_detail(&self, id: i64) -> Result<AnimeDetailResponse, ApiError> {
            Ok(AnimeDetailResponse {
                data: AnimeDto {
                    mal_id: Some(id),
                    title: Some(format!("Anime {}", id)),
                    ..Default::default()
                },
            })
        }
    }

    fn engine_with_store() -> (DetailSyncEngine, Arc<LocalStore>) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let engine =
            DetailSyncEngine::new(Arc::new(StaticApi), store.clone(), None, SyncConfig::default());
        (engine, store)
    }

    fn engine() -> DetailSyncEngine {
        engine_with_store().0
    }

    #[tokio::test]
    async fn test_refresh_then_no_change() {
        let engine = engine();
        assert_eq!(engine.refresh(9).await, Some(RefreshResult::Updated));
        assert_eq!(engine.refresh(9).await, Some(RefreshResult::NoChange));
        assert_eq!(engine.get_once(9).await.unwrap().title, "Anime 9");
    }

    #[tokio::test]
    async fn test_load_binds_and_unload_clears() {
        let engine = engine();
        assert_eq!(engine.current_id(), None);

        engine.load(3).await;
        assert_eq!(engine.current_id(), Some(3));

        engine.unload();
        assert_eq!(engine.current_id(), None);
    }

    #[tokio::test]
    async fn test_get_once_absent() {
        assert!(engine().get_once(404).await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_store_reports_failure() {
        let (engine, store) = engine_with_store();
        store.execute_raw("DROP TABLE anime_details").await.unwrap();
        let before = store.version();
        let mut events = engine.events();

        assert!(engine.get_once(1).await.is_none());
        assert_eq!(engine.refresh(1).await, Some(RefreshResult::Failure));
        assert_eq!(store.version(), before);

        let event = events.recv().await.unwrap();
        assert_eq!(event.subject, EventSubject::Detail(1));
        assert_eq!(event.to_string(), "Refresh failed");
    }

    #[tokio::test]
    async fn test_rejected_write_reports_failure() {
        let (engine, store) = engine_with_store();
        assert_eq!(engine.refresh(2).await, Some(RefreshResult::Updated));
        store
            .execute_raw(
                "CREATE TRIGGER reject_details BEFORE INSERT ON anime_details
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;
                 DELETE FROM anime_details;",
            )
            .await
            .unwrap();
        let before = store.version();
        let mut events = engine.events();

        assert_eq!(engine.refresh(2).await, Some(RefreshResult::Failure));
        assert_eq!(store.version(), before);
        assert!(engine.get_once(2).await.is_none());
        assert_eq!(events.recv().await.unwrap().to_string(), "Refresh failed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rebinding_never_leaks_previous_outcome() {
        for _ in 0..200 {
            let engine = engine();
            engine.load(5).await;
            tokio::task::yield_now().await;
            engine.load(7).await;

            let mut events = engine.events();
            let mut ui = engine.ui_state();
            tokio::time::timeout(
                Duration::from_secs(5),
                ui.wait_for(|state| match state {
                    UiState::Success(record) => {
                        assert_eq!(record.id, 7);
                        true
                    }
                    _ => false,
                }),
            )
            .await
            .expect("detail 7 not shown")
            .unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;

            while let Ok(event) = events.try_recv() {
                assert_eq!(event.subject, EventSubject::Detail(7));
            }
        }
    }
}
