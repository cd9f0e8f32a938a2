//! In-process port implementations
//!
//! Stand-ins for the engine, remote store, search API and sign-in. They
//! record every call and accept failure injection so the coordinator can be
//! driven deterministically by the demo binary and the integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use melody_common::dto::parse_search_response;
use melody_common::{LikedTrack, TrackRef, UserIdentity};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::{AuthProvider, EngineEvent, LibraryStore, LikedTracksStream, PlaybackSession, SearchBackend};
use crate::error::{CommandError, ConnectError, LibraryError, SearchError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Call received by [`ScriptedSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Connect,
    Play(String),
    Pause,
    Resume,
    SeekTo(u64),
    SkipNext,
}

/// Playback engine stand-in with call recording and failure injection
pub struct ScriptedSession {
    calls: Mutex<Vec<SessionCall>>,
    failing_connects: AtomicU32,
    connect_latency: Mutex<Duration>,
    rejected: Mutex<HashSet<&'static str>>,
    position_ms: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            calls: Mutex::new(Vec::new()),
            failing_connects: AtomicU32::new(0),
            connect_latency: Mutex::new(Duration::ZERO),
            rejected: Mutex::new(HashSet::new()),
            position_ms: AtomicU64::new(0),
            events,
        }
    }

    /// The next `count` handshakes fail
    pub fn fail_next_connects(&self, count: u32) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Delay every handshake by `latency`
    pub fn set_connect_latency(&self, latency: Duration) {
        *lock(&self.connect_latency) = latency;
    }

    /// Reject every call of `command` ("Play", "Pause", ...)
    pub fn reject(&self, command: &'static str) {
        lock(&self.rejected).insert(command);
    }

    pub fn accept_all(&self) {
        lock(&self.rejected).clear();
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<SessionCall> {
        lock(&self.calls).clone()
    }

    /// Playback calls only (handshakes excluded)
    pub fn command_calls(&self) -> Vec<SessionCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| **c != SessionCall::Connect)
            .cloned()
            .collect()
    }

    pub fn connect_attempts(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| **c == SessionCall::Connect)
            .count()
    }

    pub fn set_position(&self, position_ms: u64) {
        self.position_ms.store(position_ms, Ordering::SeqCst);
    }

    /// Inject an engine event; returns the number of listeners reached
    pub fn emit(&self, event: EngineEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    fn record(&self, call: SessionCall, command: &'static str) -> Result<(), CommandError> {
        lock(&self.calls).push(call);
        if lock(&self.rejected).contains(command) {
            return Err(CommandError::Rejected {
                command: command.to_string(),
                reason: "rejected by scripted session".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackSession for ScriptedSession {
    async fn connect(&self) -> Result<(), ConnectError> {
        lock(&self.calls).push(SessionCall::Connect);
        let latency = *lock(&self.connect_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failed = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ConnectError::Handshake("engine refused handshake".to_string()));
        }
        Ok(())
    }

    async fn play(&self, track: &TrackRef) -> Result<(), CommandError> {
        self.record(SessionCall::Play(track.id.clone()), "Play")?;
        self.position_ms.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<(), CommandError> {
        self.record(SessionCall::Pause, "Pause")
    }

    async fn resume(&self) -> Result<(), CommandError> {
        self.record(SessionCall::Resume, "Resume")
    }

    async fn seek_to(&self, position_ms: u64) -> Result<(), CommandError> {
        self.record(SessionCall::SeekTo(position_ms), "SeekTo")?;
        self.position_ms.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn skip_next(&self) -> Result<(), CommandError> {
        self.record(SessionCall::SkipNext, "SkipNext")?;
        self.position_ms.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn current_position_ms(&self) -> Result<u64, CommandError> {
        Ok(self.position_ms.load(Ordering::SeqCst))
    }

    fn engine_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Liked-tracks store held in memory, gated by an auth provider
pub struct MemoryLibrary {
    auth: Arc<dyn AuthProvider>,
    tracks: watch::Sender<Vec<LikedTrack>>,
    fail_writes: AtomicBool,
    silent_writes: AtomicBool,
    write_latency: Mutex<Duration>,
    streams_opened: AtomicUsize,
}

impl MemoryLibrary {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let (tracks, _) = watch::channel(Vec::new());
        Self {
            auth,
            tracks,
            fail_writes: AtomicBool::new(false),
            silent_writes: AtomicBool::new(false),
            write_latency: Mutex::new(Duration::ZERO),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// Replace the collection as if changed remotely; emits to every stream
    pub fn set_remote(&self, tracks: Vec<LikedTrack>) {
        self.tracks.send_replace(tracks);
    }

    /// Writes return an error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes succeed but no stream emission follows
    pub fn silent_writes(&self, silent: bool) {
        self.silent_writes.store(silent, Ordering::SeqCst);
    }

    pub fn set_write_latency(&self, latency: Duration) {
        *lock(&self.write_latency) = latency;
    }

    pub fn liked_ids(&self) -> Vec<String> {
        self.tracks.borrow().iter().map(|t| t.id.clone()).collect()
    }

    /// Number of times `stream_liked_tracks` was called
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    async fn write(&self, apply: impl FnOnce(&mut Vec<LikedTrack>)) -> Result<(), LibraryError> {
        self.auth.require_authenticated()?;
        let latency = *lock(&self.write_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LibraryError::Write("remote store unavailable".to_string()));
        }

        let notify = !self.silent_writes.load(Ordering::SeqCst);
        self.tracks.send_if_modified(|tracks| {
            apply(tracks);
            notify
        });
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for MemoryLibrary {
    fn stream_liked_tracks(&self) -> LikedTracksStream {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.auth.require_authenticated() {
            let err = LibraryError::from(err);
            return stream::once(async move { Err(err) }).boxed();
        }
        WatchStream::new(self.tracks.subscribe()).map(Ok).boxed()
    }

    async fn save(&self, track: &LikedTrack) -> Result<(), LibraryError> {
        let track = track.clone();
        debug!(track_id = %track.id, "Saving liked track");
        self.write(move |tracks| {
            tracks.retain(|t| t.id != track.id);
            tracks.push(track);
        })
        .await
    }

    async fn remove(&self, track_id: &str) -> Result<(), LibraryError> {
        debug!(track_id, "Removing liked track");
        self.write(|tracks| tracks.retain(|t| t.id != track_id)).await
    }
}

/// Search backend answering from a fixed catalog
pub struct CatalogSearch {
    catalog: Vec<TrackRef>,
    latency: Mutex<Duration>,
    query_latency: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl CatalogSearch {
    /// Load the catalog from a backend-format JSON array
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        Ok(Self::new(parse_search_response(json)?))
    }

    pub fn new(catalog: Vec<TrackRef>) -> Self {
        Self {
            catalog,
            latency: Mutex::new(Duration::ZERO),
            query_latency: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Latency for one specific query text
    pub fn set_query_latency(&self, text: &str, latency: Duration) {
        lock(&self.query_latency).insert(text.to_string(), latency);
    }

    /// Requests for `text` fail
    pub fn fail_query(&self, text: &str) {
        lock(&self.failing).insert(text.to_string());
    }

    /// Every query text requested, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Requests that ran to completion (not cancelled mid-flight)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for CatalogSearch {
    async fn search(&self, text: &str) -> Result<Vec<TrackRef>, SearchError> {
        lock(&self.calls).push(text.to_string());

        let latency = lock(&self.query_latency)
            .get(text)
            .copied()
            .unwrap_or_else(|| *lock(&self.latency));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if lock(&self.failing).contains(text) {
            return Err(SearchError::Backend(format!("backend unavailable for '{}'", text)));
        }

        let needle = text.to_lowercase();
        Ok(self
            .catalog
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle) || t.subtitle.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

/// Auth provider with a settable identity
pub struct StaticAuth {
    identity: watch::Sender<UserIdentity>,
}

impl StaticAuth {
    pub fn new(identity: UserIdentity) -> Self {
        let (identity, _) = watch::channel(identity);
        Self { identity }
    }

    pub fn signed_in(user_id: &str) -> Self {
        Self::new(UserIdentity::token(user_id))
    }

    /// Switch identity; subscribers of `identity()` are notified
    pub fn set(&self, identity: UserIdentity) {
        self.identity.send_replace(identity);
    }
}

impl AuthProvider for StaticAuth {
    fn identity(&self) -> watch::Receiver<UserIdentity> {
        self.identity.subscribe()
    }
}

/// Catalog in the search backend's wire format
const DEMO_CATALOG: &str = r#"[
    {"video_id":"yt-0001","title":"Melody M3 Theme Song","artist_name":"The Developers","thumbnail_url":"https://picsum.photos/id/160/300","item_type":"SONG"},
    {"video_id":"yt-0002","title":"Melodic Monsoon","artist_name":"Rain Collective","thumbnail_url":"https://picsum.photos/id/161/300","item_type":"SONG"},
    {"video_id":"yt-0003","title":"Midnight Melodies","artist_name":"Night Owls","item_type":"ALBUM"},
    {"video_id":"yt-0004","title":"Trending India","artist_name":"Various Artists","item_type":"PLAYLIST"}
]"#;

/// Small catalog used by the demo binary
pub fn demo_catalog() -> Vec<TrackRef> {
    parse_search_response(DEMO_CATALOG).unwrap_or_default()
}
