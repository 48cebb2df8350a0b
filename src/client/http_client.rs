use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use super::models::{AnimeDetailResponse, TopAnimeResponse};
use super::AnimeApi;
use crate::config::Config;
use crate::error::ApiError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CLIENT_USER_AGENT: &str = concat!("anisync/", env!("CARGO_PKG_VERSION"));

pub struct JikanClient {
    base_url: String,
    client: reqwest::Client,
}

impl JikanClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .default_headers(Self::default_headers())
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(&config.api_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                message,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(ApiError::EmptyBody(path.to_string()));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AnimeApi for JikanClient {
    async fn top_anime(&self, page: u32) -> Result<TopAnimeResponse, ApiError> {
        self.get(&format!("top/anime?page={}", page.max(1))).await
    }

    async fn anime_detail(&self, id: i64) -> Result<AnimeDetailResponse, ApiError> {
        self.get(&format!("anime/{}", id)).await
    }
}
