use thiserror::Error;

/// Failures reported by a remote catalog client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} {path}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("Empty response for {0}")]
    EmptyBody(String),

    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status code, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failures reported by the local cache.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Failed to register network observer: {0}")]
    Registration(String),

    #[error("Invalid probe target: {0}")]
    InvalidTarget(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_from_status_error() {
        let err = ApiError::Status {
            status: 429,
            path: "/top/anime".to_string(),
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.to_string(), "HTTP 429 /top/anime: Too Many Requests");
    }

    #[test]
    fn test_empty_body_has_no_status() {
        let err = ApiError::EmptyBody("/anime/1".to_string());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_store_error_wraps_into_top_level() {
        let err: Error = StoreError::Io(std::io::Error::other("disk full")).into();
        assert!(err.to_string().contains("disk full"));
    }
}
