//! External ports consumed by the coordinator
//!
//! Implementations live outside the core (engine bindings, remote store
//! clients, search API clients, sign-in). The coordinator only sees these
//! traits, selected once at construction through [`Ports`].
//! `memory` provides in-process implementations for the demo binary and tests.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use melody_common::{LikedTrack, TrackRef, UserIdentity};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::{AuthError, CommandError, ConnectError, LibraryError, SearchError};

/// Asynchronous notifications from the playback engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Engine dropped the session (no user action involved)
    Disconnected { reason: String },
    /// Current item finished loading and reported its length
    TrackLoaded { duration_ms: u64 },
    /// Current item played to the end
    PlaybackEnded,
}

/// Out-of-process playback engine
///
/// Every call may fail individually; a failure never ends the port.
#[async_trait]
pub trait PlaybackSession: Send + Sync {
    /// Handshake with the engine
    async fn connect(&self) -> Result<(), ConnectError>;

    async fn play(&self, track: &TrackRef) -> Result<(), CommandError>;

    async fn pause(&self) -> Result<(), CommandError>;

    async fn resume(&self) -> Result<(), CommandError>;

    async fn seek_to(&self, position_ms: u64) -> Result<(), CommandError>;

    async fn skip_next(&self) -> Result<(), CommandError>;

    async fn current_position_ms(&self) -> Result<u64, CommandError>;

    /// Subscribe to engine-reported events
    fn engine_events(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Live, restartable sequence of liked-track collections
pub type LikedTracksStream = BoxStream<'static, Result<Vec<LikedTrack>, LibraryError>>;

/// Remote store of the user's liked tracks
///
/// Requires an authenticated identity; otherwise every call returns
/// [`LibraryError::NotAuthenticated`].
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Lazy, infinite stream of the full collection. Calling again restarts it.
    fn stream_liked_tracks(&self) -> LikedTracksStream;

    async fn save(&self, track: &LikedTrack) -> Result<(), LibraryError>;

    async fn remove(&self, track_id: &str) -> Result<(), LibraryError>;
}

/// Catalog search; dropping the returned future cancels the request
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, text: &str) -> Result<Vec<TrackRef>, SearchError>;
}

/// Supplies the current user identity; sign-in happens elsewhere
pub trait AuthProvider: Send + Sync {
    fn identity(&self) -> watch::Receiver<UserIdentity>;

    fn current(&self) -> UserIdentity {
        self.identity().borrow().clone()
    }

    /// Current identity if it may use the remote library
    fn require_authenticated(&self) -> Result<UserIdentity, AuthError> {
        let identity = self.current();
        if identity.is_authenticated() {
            Ok(identity)
        } else {
            Err(AuthError::Unavailable)
        }
    }
}

/// Port implementations selected at construction time
#[derive(Clone)]
pub struct Ports {
    pub session: Arc<dyn PlaybackSession>,
    pub library: Arc<dyn LibraryStore>,
    pub search: Arc<dyn SearchBackend>,
    pub auth: Arc<dyn AuthProvider>,
}
