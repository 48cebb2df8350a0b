//! Remote DTO to cache entity conversion

use std::collections::HashSet;

use crate::client::models::{AnimeDto, Images, NamedResource};
use crate::store::{DetailRecord, ListItem};
use crate::video::extract_video_id;

pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Convert one remote page. Entries without an id are dropped, and repeated
/// ids keep their first occurrence.
pub fn map_list(dtos: Vec<AnimeDto>, now: i64) -> Vec<ListItem> {
    let mut seen = HashSet::new();

    dtos.into_iter()
        .filter_map(|dto| {
            let id = dto.mal_id?;
            if !seen.insert(id) {
                return None;
            }
            Some(ListItem {
                id,
                title: title_of(&dto),
                synopsis: non_blank(dto.synopsis),
                episodes: dto.episodes,
                score: dto.score,
                poster_url: poster_url(dto.images.as_ref()),
                last_updated: now,
            })
        })
        .collect()
}

/// Convert a detail response for the requested id.
pub fn map_detail(id: i64, dto: AnimeDto, now: i64) -> DetailRecord {
    let video_id = dto
        .trailer
        .as_ref()
        .and_then(|t| t.embed_url.as_deref().or(t.url.as_deref()))
        .and_then(extract_video_id);

    DetailRecord {
        id,
        title: title_of(&dto),
        genres: join_names(dto.genres.as_deref()),
        cast: join_names(dto.producers.as_deref()),
        episodes: dto.episodes,
        score: dto.score,
        poster_url: poster_url(dto.images.as_ref()),
        video_id,
        synopsis: non_blank(dto.synopsis),
        last_updated: now,
    }
}

fn title_of(dto: &AnimeDto) -> String {
    dto.title
        .clone()
        .or_else(|| dto.title_english.clone())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn poster_url(images: Option<&Images>) -> Option<String> {
    let images = images?;
    images
        .jpg
        .as_ref()
        .and_then(|set| set.image_url.clone())
        .or_else(|| images.webp.as_ref().and_then(|set| set.image_url.clone()))
}

fn join_names(resources: Option<&[NamedResource]>) -> Option<String> {
    let names: Vec<&str> = resources?
        .iter()
        .filter_map(|r| r.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}
