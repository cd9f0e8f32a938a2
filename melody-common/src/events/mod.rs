//! Event and snapshot types for Melody
//!
//! Provides the snapshot types observers receive and the transient
//! notification events.

// Sub-modules (supporting types)
mod home_types;
mod library_types;
mod playback_types;
mod search_types;

pub use home_types::RecommendationsView;
pub use library_types::LibraryView;
pub use playback_types::{
    ConnectionStatus, ErrorInfo, ErrorKind, PlaybackState, SessionConnection, Snapshot,
};
pub use search_types::{SearchQuery, SearchState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a transient notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Short-lived user-facing message ("Added to Library: ...")
///
/// Notifications are lossy: an observer that falls behind misses them.
/// Nothing in the playback state depends on their delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            timestamp: crate::time::now(),
        }
    }
}
