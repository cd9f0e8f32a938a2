//! Playback and session snapshot types
//!
//! Supporting types for the single authoritative playback/session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::TrackRef;

/// Category of a failure surfaced in `PlaybackState::last_error`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    /// Handshake or transport failure with the playback engine
    Connection,
    /// A play/pause/seek call rejected by the session
    Command,
    /// Save/remove/stream failure of the remote library
    Library,
    /// Search backend failure
    Search,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "Connection"),
            ErrorKind::Command => write!(f, "Command"),
            ErrorKind::Library => write!(f, "Library"),
            ErrorKind::Search => write!(f, "Search"),
        }
    }
}

/// Visible description of the most recent failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: crate::time::now(),
        }
    }
}

/// The single mutable playback aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlaybackState {
    pub current_track: Option<TrackRef>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_liked: bool,
    pub last_error: Option<ErrorInfo>,
}

impl PlaybackState {
    /// Id of the current track, if any
    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }
}

/// Lifecycle status of the connection to the playback engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionConnection {
    pub status: ConnectionStatus,
    /// Consecutive failed handshakes in the current connect cycle
    pub attempt: u32,
}

impl SessionConnection {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Immutable copy of the hub state delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Snapshot {
    /// Incremented on every published change
    pub revision: u64,
    pub playback: PlaybackState,
    pub connection: SessionConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.revision, 0);
        assert!(snapshot.playback.current_track.is_none());
        assert!(!snapshot.playback.is_playing);
        assert_eq!(snapshot.connection.status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.connection.attempt, 0);
    }

    #[test]
    fn test_status_serializes_pascal_case() {
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "\"Connecting\"");
    }
}
