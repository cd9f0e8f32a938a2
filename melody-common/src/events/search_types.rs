//! Search query and result state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::TrackRef;

/// One issued query edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    /// Strictly increasing per coordinator instance
    pub sequence: u64,
    pub issued_at: DateTime<Utc>,
}

/// Visible search state owned by the search coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchState {
    /// Latest query text as typed
    pub query: String,
    /// Sequence the current `results`/`error` belong to
    pub sequence: u64,
    pub results: Vec<TrackRef>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Search bar open; closing it resets the whole state
    pub is_active: bool,
}
