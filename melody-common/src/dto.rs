//! Search backend DTOs
//!
//! The backend returns music items with snake_case keys and a free-form
//! `item_type` tag. Mapping onto `TrackRef` never fails on the tag.

use serde::{Deserialize, Serialize};

use crate::track::{TrackKind, TrackRef};
use crate::Result;

/// Music item as received from the search backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicItemDto {
    #[serde(rename = "video_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(rename = "item_type", default)]
    pub item_type: String,
}

impl From<MusicItemDto> for TrackRef {
    fn from(dto: MusicItemDto) -> Self {
        TrackRef {
            kind: TrackKind::from_tag(&dto.item_type),
            id: dto.id,
            title: dto.title,
            subtitle: dto.artist_name,
            artwork_url: dto.thumbnail_url,
        }
    }
}

/// Parse a JSON array of music items into track references
pub fn parse_search_response(json: &str) -> Result<Vec<TrackRef>> {
    let items: Vec<MusicItemDto> = serde_json::from_str(json)?;
    Ok(items.into_iter().map(TrackRef::from).collect())
}
