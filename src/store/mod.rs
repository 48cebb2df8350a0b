//! Local persistent cache
//!
//! The store is the single source of truth for what callers display. Sync
//! engines write fetched data into it; observers re-read after each write.

pub mod entities;
mod observe;
pub mod sqlite;

pub use entities::{DetailRecord, ListItem};
pub use sqlite::{LocalStore, StoreResult, StoreVersion};

/// Current Unix time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
