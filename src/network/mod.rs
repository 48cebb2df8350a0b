//! Network availability monitoring
//!
//! [`ConnectivityMonitor`] turns callbacks from a platform [`NetworkObserver`]
//! into a de-duplicated stream of [`NetworkStatus`] values. The observer is
//! registered when the first subscription is taken and unregistered when the
//! last one is dropped.

pub mod monitor;
pub mod probe;

pub use monitor::{ConnectivityMonitor, ConnectivitySubscription, NetworkObserver, StatusSink};
pub use probe::TcpProbeObserver;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkStatus {
    Available,
    Unavailable,
}

impl NetworkStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            NetworkStatus::Available
        } else {
            NetworkStatus::Unavailable
        }
    }

    pub fn is_available(self) -> bool {
        self == NetworkStatus::Available
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkStatus::Available => write!(f, "available"),
            NetworkStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}
