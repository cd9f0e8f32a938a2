//! Home screen recommendations view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::TrackRef;

/// Trending list shown on the home screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecommendationsView {
    pub tracks: Vec<TrackRef>,
    pub is_loading: bool,
    /// Failure of the latest load; `tracks` keeps the previous list
    pub error: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}
