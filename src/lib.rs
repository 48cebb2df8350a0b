pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod store;
pub mod sync;
pub mod video;

pub use client::{AnimeApi, JikanClient};
pub use config::Config;
pub use error::{ApiError, ConnectivityError, Error, Result, StoreError};
pub use network::{ConnectivityMonitor, NetworkObserver, NetworkStatus, StatusSink, TcpProbeObserver};
pub use store::{DetailRecord, ListItem, LocalStore};
pub use sync::{
    DetailSyncEngine, ListSyncEngine, RefreshResult, SyncConfig, SyncEvent, SyncSession, UiState,
};
pub use video::{build_watch_url, extract_video_id};
