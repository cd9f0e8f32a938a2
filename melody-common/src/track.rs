//! Track reference types
//!
//! `TrackRef` is the immutable handle every component passes around. Its
//! identity is the `id`; all other fields are display metadata.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Kind of catalog item a `TrackRef` points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum TrackKind {
    #[default]
    Song,
    Album,
    Playlist,
    Artist,
}

impl TrackKind {
    /// Map a remote type tag (e.g. `"SONG"`, `"album"`) onto a kind.
    ///
    /// Unrecognized tags fall back to `Song` instead of failing.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "SONG" => TrackKind::Song,
            "ALBUM" => TrackKind::Album,
            "PLAYLIST" => TrackKind::Playlist,
            "ARTIST" => TrackKind::Artist,
            _ => TrackKind::Song,
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Song => write!(f, "Song"),
            TrackKind::Album => write!(f, "Album"),
            TrackKind::Playlist => write!(f, "Playlist"),
            TrackKind::Artist => write!(f, "Artist"),
        }
    }
}

/// Immutable reference to a playable catalog item
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRef {
    /// Stable key shared with the remote library (`LikedTrack::id`)
    pub id: String,
    pub title: String,
    /// Artist or channel name
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub artwork_url: String,
    #[serde(default)]
    pub kind: TrackKind,
}

impl TrackRef {
    /// Create a song reference with empty metadata besides the title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: String::new(),
            artwork_url: String::new(),
            kind: TrackKind::Song,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_artwork(mut self, artwork_url: impl Into<String>) -> Self {
        self.artwork_url = artwork_url.into();
        self
    }

    pub fn with_kind(mut self, kind: TrackKind) -> Self {
        self.kind = kind;
        self
    }
}

impl PartialEq for TrackRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TrackRef {}

impl Hash for TrackRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
