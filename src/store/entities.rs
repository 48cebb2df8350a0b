use serde::{Deserialize, Serialize};

/// One ranked catalog entry as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: i64,
    pub title: String,
    pub synopsis: Option<String>,
    pub episodes: Option<u32>,
    pub score: Option<f64>,
    pub poster_url: Option<String>,
    /// Unix millis of the fetch that produced this row
    pub last_updated: i64,
}

impl ListItem {
    /// Whether the fields shown in the list differ. Missing poster, score and
    /// episode values compare equal to an empty/sentinel value.
    pub fn differs_from(&self, other: &ListItem) -> bool {
        self.title != other.title
            || self.poster_url.as_deref().unwrap_or("") != other.poster_url.as_deref().unwrap_or("")
            || self.score.unwrap_or(-1.0) != other.score.unwrap_or(-1.0)
            || self.episodes.map(i64::from).unwrap_or(-1) != other.episodes.map(i64::from).unwrap_or(-1)
    }
}

/// Full detail page for one anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: i64,
    pub title: String,
    pub synopsis: Option<String>,
    /// Comma-joined genre names
    pub genres: Option<String>,
    /// Comma-joined producer names
    pub cast: Option<String>,
    pub episodes: Option<u32>,
    pub score: Option<f64>,
    pub poster_url: Option<String>,
    /// 11-character trailer video id
    pub video_id: Option<String>,
    pub last_updated: i64,
}

impl DetailRecord {
    /// Structural equality ignoring `last_updated`.
    pub fn same_content(&self, other: &DetailRecord) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.synopsis == other.synopsis
            && self.genres == other.genres
            && self.cast == other.cast
            && self.episodes == other.episodes
            && self.score == other.score
            && self.poster_url == other.poster_url
            && self.video_id == other.video_id
    }
}
