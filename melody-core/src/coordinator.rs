//! Coordinator facade
//!
//! Constructs the hub and every component once, wires them to the selected
//! ports and owns their background tasks. Callers only see [`Command`],
//! the subscribe/snapshot API and a few lifecycle calls.

use std::sync::{Arc, Mutex};

use melody_common::config::CoordinatorConfig;
use melody_common::events::{
    ConnectionStatus, LibraryView, Notification, RecommendationsView, SearchState, Snapshot,
};
use melody_common::{LikedTrack, TrackRef};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::home::RecommendationsLoader;
use crate::library::LibraryReconciler;
use crate::notify::Notifier;
use crate::ports::Ports;
use crate::search::SearchCoordinator;
use crate::session::{
    CommandDispatcher, ConnectionManager, DispatchOutcome, PlaybackCommand, PositionPoller,
    RetryPolicy,
};
use crate::state::{StateHub, Subscription};

/// Everything a caller can ask the coordinator to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Command {
    Play(TrackRef),
    Pause,
    Resume,
    SeekTo(u64),
    SkipNext,
    ToggleLike,
    SetSearchQuery(String),
    /// Pause if playing, otherwise resume
    TogglePlayback,
    /// Leave search and drop any pending request
    ClearSearch,
    /// Open or close the search bar; closing clears the search
    SetSearchActive(bool),
    /// Play an entry of the liked-tracks library
    PlayLiked(LikedTrack),
    /// Reload the home screen trending list
    RefreshRecommendations,
}

impl Command {
    fn into_playback(self) -> Option<PlaybackCommand> {
        match self {
            Command::Play(track) => Some(PlaybackCommand::Play(track)),
            Command::PlayLiked(liked) => Some(PlaybackCommand::Play(liked.to_track_ref())),
            Command::Pause => Some(PlaybackCommand::Pause),
            Command::Resume => Some(PlaybackCommand::Resume),
            Command::SeekTo(position_ms) => Some(PlaybackCommand::SeekTo(position_ms)),
            Command::SkipNext => Some(PlaybackCommand::SkipNext),
            _ => None,
        }
    }
}

/// Notification shown when a playback command is accepted
fn announcement(command: &Command) -> Option<String> {
    match command {
        Command::Play(track) => Some(format!("Now playing: {}", track.title)),
        Command::PlayLiked(liked) => Some(format!("Now playing: {}", liked.title)),
        Command::SkipNext => Some("Skipping to next track...".to_string()),
        _ => None,
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    hub: Arc<StateHub>,
    dispatcher: Arc<CommandDispatcher>,
    connection: ConnectionManager,
    library: Arc<LibraryReconciler>,
    search: Arc<SearchCoordinator>,
    home: Arc<RecommendationsLoader>,
    notifier: Notifier,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build every component and spawn the background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CoordinatorConfig, ports: Ports) -> Self {
        let shutdown = CancellationToken::new();
        let hub = StateHub::new();
        let notifier = Notifier::default();

        let (dispatcher, executor) = CommandDispatcher::new(Arc::clone(&hub), Arc::clone(&ports.session));
        let dispatcher = Arc::new(dispatcher);

        let connection = ConnectionManager::new(
            Arc::clone(&hub),
            Arc::clone(&ports.session),
            Arc::clone(&dispatcher),
            RetryPolicy::from_config(&config.connection),
            shutdown.clone(),
        );
        let engine_watcher = connection.engine_watcher();

        let library = LibraryReconciler::new(
            Arc::clone(&hub),
            Arc::clone(&ports.library),
            Arc::clone(&ports.auth),
            notifier.clone(),
            &config.library,
            shutdown.clone(),
        );
        let search = SearchCoordinator::new(Arc::clone(&ports.search), &config.search, shutdown.clone());
        let home = RecommendationsLoader::new(
            Arc::clone(&ports.search),
            notifier.clone(),
            &config.home,
            shutdown.clone(),
        );
        if config.home.load_on_start {
            home.refresh();
        }

        let poller = PositionPoller::new(
            Arc::clone(&hub),
            Arc::clone(&ports.session),
            std::time::Duration::from_millis(config.playback.position_poll_interval_ms),
        );

        let tasks = vec![
            tokio::spawn(executor.run(shutdown.clone())),
            tokio::spawn(engine_watcher.run(shutdown.clone())),
            tokio::spawn(poller.run(shutdown.clone())),
            tokio::spawn(Arc::clone(&library).run()),
        ];

        info!(
            auto_connect = config.connection.auto_connect,
            max_attempts = config.connection.max_attempts,
            debounce_ms = config.search.debounce_ms,
            "Coordinator started"
        );

        Self {
            config,
            hub,
            dispatcher,
            connection,
            library,
            search,
            home,
            notifier,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Route one command to the component that owns it
    ///
    /// Only `ToggleLike` can fail (no authenticated identity); every other
    /// failure surfaces later through the published state.
    pub fn dispatch(&self, command: Command) -> Result<()> {
        debug!(?command, "Dispatching");
        match command {
            Command::ToggleLike => {
                self.library.toggle_like()?;
            }
            Command::SetSearchQuery(text) => {
                self.search.set_query(text);
            }
            Command::ClearSearch => self.search.clear(),
            Command::SetSearchActive(active) => self.search.set_active(active),
            Command::RefreshRecommendations => {
                self.home.refresh();
            }
            Command::TogglePlayback => {
                let outcome = self.dispatcher.toggle_playback();
                self.auto_connect(outcome);
            }
            other => {
                let announcement = announcement(&other);
                if let Some(command) = other.into_playback() {
                    let outcome = self.dispatcher.dispatch(command);
                    self.auto_connect(outcome);
                }
                if let Some(message) = announcement {
                    self.notifier.info(message);
                }
            }
        }
        Ok(())
    }

    fn auto_connect(&self, outcome: DispatchOutcome) {
        if outcome == DispatchOutcome::Queued
            && self.config.connection.auto_connect
            && self.connection.status() == ConnectionStatus::Disconnected
        {
            debug!("Playback command while disconnected, connecting");
            self.connection.connect();
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.hub.current_snapshot()
    }

    /// Latest-value snapshot receiver
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.hub.watch()
    }

    pub fn connect(&self) -> bool {
        self.connection.connect()
    }

    pub fn reconnect(&self) -> bool {
        self.connection.reconnect()
    }

    pub fn disconnect(&self) {
        self.connection.disconnect()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn search_state(&self) -> SearchState {
        self.search.state()
    }

    pub fn search_results(&self) -> watch::Receiver<SearchState> {
        self.search.subscribe()
    }

    pub fn recommendations(&self) -> watch::Receiver<RecommendationsView> {
        self.home.subscribe()
    }

    pub fn library(&self) -> watch::Receiver<LibraryView> {
        self.library.library()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Wait until the session has executed every command handed to it so far
    pub async fn settled(&self) {
        self.dispatcher.settled().await
    }

    /// Cancel every background task and wait for them to stop
    pub async fn shutdown(&self) {
        info!("Shutting down coordinator");
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
