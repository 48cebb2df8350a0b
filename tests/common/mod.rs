//! Common test utilities for sync engine tests
//!
//! Provides:
//! - `FakeApi`, a scripted remote catalog with call counters and a gate
//! - `ManualObserver`, a network observer driven by the test
//! - Store and DTO builders

#![allow(dead_code)]

use anisync::client::models::{AnimeDetailResponse, AnimeDto, ImageSet, Images, NamedResource, Trailer};
use anisync::client::{AnimeApi, TopAnimeResponse};
use anisync::error::{ApiError, ConnectivityError};
use anisync::network::{NetworkObserver, NetworkStatus, StatusSink};
use anisync::store::{ListItem, LocalStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;

const OPEN_PERMITS: usize = 1024;

/// Remote catalog double. Calls are counted before passing the gate, so a
/// test can observe that a fetch has started while it is held.
pub struct FakeApi {
    list: Mutex<Option<Vec<AnimeDto>>>,
    details: Mutex<HashMap<i64, AnimeDto>>,
    list_calls: AtomicUsize,
    detail_calls: Mutex<Vec<i64>>,
    gate: Semaphore,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Self::with_permits(OPEN_PERMITS)
    }

    /// Every call blocks until [`FakeApi::open`] is called.
    pub fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            list: Mutex::new(Some(Vec::new())),
            details: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            detail_calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(permits),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(OPEN_PERMITS);
    }

    pub fn set_list(&self, items: Vec<AnimeDto>) {
        *self.list.lock() = Some(items);
    }

    /// Make list fetches answer HTTP 500
    pub fn fail_list(&self) {
        *self.list.lock() = None;
    }

    pub fn set_detail(&self, id: i64, dto: AnimeDto) {
        self.details.lock().insert(id, dto);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> Vec<i64> {
        self.detail_calls.lock().clone()
    }

    pub fn detail_calls_for(&self, id: i64) -> usize {
        self.detail_calls.lock().iter().filter(|&&call| call == id).count()
    }

    async fn pass_gate(&self) {
        let _permit = self.gate.acquire().await.expect("gate closed");
    }
}

#[async_trait]
impl AnimeApi for FakeApi {
    async fn top_anime(&self, page: u32) -> Result<TopAnimeResponse, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        let list = self.list.lock().clone();
        match list {
            Some(data) => Ok(TopAnimeResponse {
                data,
                pagination: None,
            }),
            None => Err(ApiError::Status {
                status: 500,
                path: format!("top/anime?page={}", page),
                message: "Internal Server Error".to_string(),
            }),
        }
    }

    async fn anime_detail(&self, id: i64) -> Result<AnimeDetailResponse, ApiError> {
        self.detail_calls.lock().push(id);
        self.pass_gate().await;

        let data = self.details.lock().get(&id).cloned();
        match data {
            Some(data) => Ok(AnimeDetailResponse { data }),
            None => Err(ApiError::Status {
                status: 404,
                path: format!("anime/{}", id),
                message: "Not Found".to_string(),
            }),
        }
    }
}

/// Network observer whose state is set by the test.
pub struct ManualObserver {
    status: Mutex<NetworkStatus>,
    sink: Mutex<Option<StatusSink>>,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
    fail_registration: AtomicBool,
}

impl ManualObserver {
    pub fn new(initial: NetworkStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(initial),
            sink: Mutex::new(None),
            registrations: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
            fail_registration: AtomicBool::new(false),
        })
    }

    pub fn failing(initial: NetworkStatus) -> Arc<Self> {
        let observer = Self::new(initial);
        observer.fail_registration.store(true, Ordering::SeqCst);
        observer
    }

    pub fn set(&self, status: NetworkStatus) {
        *self.status.lock() = status;
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.send(status);
        }
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }
}

impl NetworkObserver for ManualObserver {
    fn current_status(&self) -> NetworkStatus {
        *self.status.lock()
    }

    fn register(&self, sink: StatusSink) -> Result<(), ConnectivityError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(ConnectivityError::Registration("permission denied".to_string()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn unregister(&self) {
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take();
    }
}

pub fn temp_store() -> (Arc<LocalStore>, TempDir) {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = LocalStore::open(tmp_dir.path().join("anime.db")).expect("Failed to open store");
    (Arc::new(store), tmp_dir)
}

pub fn anime(id: i64, title: &str, score: f64) -> AnimeDto {
    AnimeDto {
        mal_id: Some(id),
        title: Some(title.to_string()),
        synopsis: Some(format!("Synopsis of {}", title)),
        episodes: Some(12),
        score: Some(score),
        images: Some(Images {
            jpg: Some(ImageSet {
                image_url: Some(format!("https://cdn.myanimelist.net/images/anime/{}.jpg", id)),
            }),
            webp: None,
        }),
        ..Default::default()
    }
}

pub fn detail(id: i64, title: &str) -> AnimeDto {
    AnimeDto {
        genres: Some(vec![
            NamedResource {
                mal_id: Some(1),
                name: Some("Action".to_string()),
            },
            NamedResource {
                mal_id: Some(24),
                name: Some("Sci-Fi".to_string()),
            },
        ]),
        producers: Some(vec![NamedResource {
            mal_id: Some(23),
            name: Some("Bandai Visual".to_string()),
        }]),
        trailer: Some(Trailer {
            youtube_id: Some("qig4KOK2R2g".to_string()),
            url: None,
            embed_url: Some("https://www.youtube.com/embed/qig4KOK2R2g?enablejsapi=1".to_string()),
        }),
        ..anime(id, title, 8.75)
    }
}

pub fn list_item(id: i64, score: f64) -> ListItem {
    ListItem {
        id,
        title: format!("Cached {}", id),
        synopsis: None,
        episodes: Some(12),
        score: Some(score),
        poster_url: None,
        last_updated: 0,
    }
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Give background tasks time to act on anything pending.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
