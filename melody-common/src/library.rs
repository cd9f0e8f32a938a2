//! Remote library records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::{TrackKind, TrackRef};

/// A track saved to the user's remote library
///
/// Owned by the remote store. `id` matches `TrackRef::id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artwork_url: String,
    pub saved_at: DateTime<Utc>,
}

impl LikedTrack {
    /// Build the record written when the user likes `track`
    pub fn from_track(track: &TrackRef, saved_at: DateTime<Utc>) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            artist: track.subtitle.clone(),
            artwork_url: track.artwork_url.clone(),
            saved_at,
        }
    }

    /// Convert back into a playable reference (library entries are songs)
    pub fn to_track_ref(&self) -> TrackRef {
        TrackRef {
            id: self.id.clone(),
            title: self.title.clone(),
            subtitle: self.artist.clone(),
            artwork_url: self.artwork_url.clone(),
            kind: TrackKind::Song,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    #[test]
    fn test_track_round_trip_keeps_identity_and_metadata() {
        let track = TrackRef::new("vid-42", "Monsoon")
            .with_subtitle("The Developers")
            .with_artwork("https://img.example/42.jpg")
            .with_kind(TrackKind::Album);

        let liked = LikedTrack::from_track(&track, time::now());
        assert_eq!(liked.artist, "The Developers");

        let back = liked.to_track_ref();
        assert_eq!(back, track);
        assert_eq!(back.kind, TrackKind::Song);
        assert_eq!(back.artwork_url, "https://img.example/42.jpg");
    }
}
