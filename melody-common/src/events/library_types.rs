//! Library view published by the reconciliation engine

use serde::{Deserialize, Serialize};

use crate::library::LikedTrack;

/// Latest reconciled liked-tracks list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryView {
    pub tracks: Vec<LikedTrack>,
    /// True until the first emission of the current subscription
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for LibraryView {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            is_loading: true,
            error: None,
        }
    }
}

impl LibraryView {
    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t.id == track_id)
    }
}
