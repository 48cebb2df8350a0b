//! Trailer video identifier extraction.

use once_cell::sync::Lazy;
use regex::Regex;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";
const VIDEO_ID_LEN: usize = 11;

// Order matters: the first matching pattern wins.
static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/embed/([A-Za-z0-9_-]{11})",
        r"[?&]v=([A-Za-z0-9_-]{11})",
        r"youtu\.be/([A-Za-z0-9_-]{11})",
        r"/v/([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("video id pattern is a valid regex"))
    .collect()
});

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Extract the 11-character video id from an embed URL, watch URL, short
/// link, or a bare id. Returns `None` when nothing id-like is found.
pub fn extract_video_id(input: &str) -> Option<String> {
    if input.trim().is_empty() {
        return None;
    }

    for re in VIDEO_ID_PATTERNS.iter() {
        if let Some(caps) = re.captures(input) {
            return Some(caps[1].to_string());
        }
    }

    // ASCII only, the same character class the patterns above accept.
    let trimmed = input.trim();
    if trimmed.chars().count() == VIDEO_ID_LEN && trimmed.chars().all(is_id_char) {
        return Some(trimmed.to_string());
    }

    None
}

/// Canonical watch URL for an embed/watch URL or id. Unrecognised input is
/// used verbatim as the id.
pub fn build_watch_url(embed_or_watch_or_id: &str) -> String {
    let id = extract_video_id(embed_or_watch_or_id)
        .unwrap_or_else(|| embed_or_watch_or_id.to_string());
    format!("{}{}", WATCH_URL_PREFIX, id)
}
