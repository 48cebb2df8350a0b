//! Cache synchronization engines
//!
//! This module provides:
//! - [`ListSyncEngine`] for the ranked catalog page
//! - [`DetailSyncEngine`] for one anime at a time
//! - Diff-before-write reconciliation against the [`LocalStore`](crate::store::LocalStore)
//! - Connectivity-driven re-sync running as background tasks
//!
//! Both engines resolve every cycle to a [`RefreshResult`] and publish a
//! one-shot [`SyncEvent`] describing it.

pub mod detail;
pub mod list;
pub mod mapping;
pub mod state;

pub use detail::DetailSyncEngine;
pub use list::{diff_list, ListChange, ListSyncEngine};
pub use state::{EventSubject, RefreshResult, SyncEvent, UiState};

use tokio::task::JoinHandle;

use crate::config::Config;

/// Engine settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the outcome event channel
    pub event_capacity: usize,
    /// Page fetched by cold-start and connectivity refreshes
    pub default_page: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_capacity: 4,
            default_page: 1,
        }
    }
}

impl From<&Config> for SyncConfig {
    fn from(config: &Config) -> Self {
        Self {
            event_capacity: config.event_capacity,
            ..Self::default()
        }
    }
}

/// Handle over an engine's background tasks. Dropping it aborts them.
pub struct SyncSession {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSession {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    /// Whether any background task is still running
    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    pub fn close(self) {}
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
