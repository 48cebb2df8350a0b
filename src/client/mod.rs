//! Remote catalog client
//!
//! [`AnimeApi`] is the seam the sync engines fetch through; [`JikanClient`]
//! implements it over HTTP.

mod http_client;
pub mod models;

pub use http_client::JikanClient;
pub use models::{AnimeDetailResponse, AnimeDto, TopAnimeResponse};

use async_trait::async_trait;

use crate::error::ApiError;

/// Read-only access to the remote catalog.
///
/// Implementations own timeouts and transport concerns; callers treat every
/// `Err` uniformly as a failed fetch and do not retry.
#[async_trait]
pub trait AnimeApi: Send + Sync {
    /// One page of the score-ranked catalog (pages start at 1).
    async fn top_anime(&self, page: u32) -> Result<TopAnimeResponse, ApiError>;

    async fn anime_detail(&self, id: i64) -> Result<AnimeDetailResponse, ApiError>;
}
