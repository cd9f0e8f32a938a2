//! Session connection manager
//!
//! Owns the `SessionConnection` lifecycle:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                           Connecting --err--> Failed --backoff--> Connecting
//! Failed (attempts exhausted) --reconnect--> Connecting (attempt = 0)
//! Connected --engine disconnect--> Disconnected
//! any --disconnect--> Disconnected
//! ```
//!
//! Every status write goes through [`next_status`]; nothing else in the crate
//! assigns `SessionConnection::status`.
//!
//! Each connect attempt carries its own `CancellationToken`, stored in the
//! hub. A handshake result is applied only if its token is still live when
//! the hub lock is held, so a cancelled attempt can never publish.

use std::sync::Arc;
use std::time::Duration;

use melody_common::config::ConnectionConfig;
use melody_common::events::{ConnectionStatus, ErrorKind};
use melody_common::time;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::CommandDispatcher;
use crate::error::{ConnectError, Error};
use crate::ports::{EngineEvent, PlaybackSession};
use crate::state::{HubState, StateHub};

/// Inputs to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    HandshakeSucceeded,
    HandshakeFailed,
    RetryScheduled,
    ReconnectRequested,
    DisconnectRequested,
    EngineDisconnected,
}

/// Transition table; `None` means the event does not apply in `current`
pub fn next_status(current: ConnectionStatus, event: ConnectionEvent) -> Option<ConnectionStatus> {
    use ConnectionEvent::*;
    use ConnectionStatus::*;

    match (current, event) {
        (Disconnected, ConnectRequested) => Some(Connecting),
        (Connecting, HandshakeSucceeded) => Some(Connected),
        (Connecting, HandshakeFailed) => Some(Failed),
        (Failed, RetryScheduled) => Some(Connecting),
        (Disconnected | Connecting | Failed, ReconnectRequested) => Some(Connecting),
        (Connecting | Connected | Failed, DisconnectRequested) => Some(Disconnected),
        (Connected, EngineDisconnected) => Some(Disconnected),
        _ => None,
    }
}

fn transition(state: &mut HubState, event: ConnectionEvent) -> bool {
    let current = state.connection.status;
    match next_status(current, event) {
        Some(next) => {
            if next != current {
                debug!(from = %current, to = %next, ?event, "Connection transition");
            }
            state.connection.status = next;
            true
        }
        None => {
            debug!(status = %current, ?event, "Connection event ignored");
            false
        }
    }
}

/// Exponential backoff between automatic connect retries
///
/// `delay_for(n)` is the wait after the n-th consecutive failure:
/// `min(base * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
        )
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether another automatic attempt follows `failed_attempts` failures
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

enum Step {
    Stop,
    RetryAfter(Duration),
}

/// Establishes and supervises the connection to the playback engine
#[derive(Clone)]
pub struct ConnectionManager {
    hub: Arc<StateHub>,
    session: Arc<dyn PlaybackSession>,
    dispatcher: Arc<CommandDispatcher>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        hub: Arc<StateHub>,
        session: Arc<dyn PlaybackSession>,
        dispatcher: Arc<CommandDispatcher>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            session,
            dispatcher,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Start connecting from `Disconnected`
    ///
    /// No-op while `Connecting`, `Connected` or `Failed` (a failed session
    /// is either retrying on its own or waiting for [`reconnect`]).
    /// Returns true if an attempt was started.
    ///
    /// [`reconnect`]: ConnectionManager::reconnect
    pub fn connect(&self) -> bool {
        let token = self.hub.mutate("connection", |state| {
            if !transition(state, ConnectionEvent::ConnectRequested) {
                return None;
            }
            state.connection.attempt = 0;
            Some(self.begin_attempt(state))
        });

        match token {
            Some(token) => {
                info!("Connecting to playback engine");
                self.spawn_attempts(token);
                true
            }
            None => false,
        }
    }

    /// Cancel any in-flight attempt, reset `attempt` to 0 and connect again
    ///
    /// No-op while `Connected`.
    pub fn reconnect(&self) -> bool {
        let token = self.hub.mutate("connection", |state| {
            if state.connection.status == ConnectionStatus::Connected {
                return None;
            }
            if let Some(previous) = state.connect_attempt.take() {
                previous.cancel();
            }
            state.connection.attempt = 0;
            transition(state, ConnectionEvent::ReconnectRequested);
            Some(self.begin_attempt(state))
        });

        match token {
            Some(token) => {
                info!("Reconnecting to playback engine");
                self.spawn_attempts(token);
                true
            }
            None => {
                debug!("Reconnect ignored, already connected");
                false
            }
        }
    }

    /// Go to `Disconnected`, cancelling any in-flight connect attempt
    pub fn disconnect(&self) {
        self.hub.mutate("connection", |state| {
            if let Some(attempt) = state.connect_attempt.take() {
                attempt.cancel();
            }
            if transition(state, ConnectionEvent::DisconnectRequested) {
                info!("Disconnected from playback engine");
            }
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.hub.read(|state| state.connection.status)
    }

    /// Subscribe to engine events now; run the returned watcher to apply them
    pub fn engine_watcher(&self) -> EngineWatcher {
        EngineWatcher {
            hub: Arc::clone(&self.hub),
            events: self.session.engine_events(),
        }
    }

    fn begin_attempt(&self, state: &mut HubState) -> CancellationToken {
        let token = self.shutdown.child_token();
        state.connect_attempt = Some(token.clone());
        token
    }

    fn spawn_attempts(&self, token: CancellationToken) {
        let manager = self.clone();
        tokio::spawn(async move { manager.run_attempts(token).await });
    }

    async fn run_attempts(self, token: CancellationToken) {
        loop {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Connect attempt cancelled");
                    return;
                }
                result = self.session.connect() => result,
            };

            match self.apply_handshake(&token, result) {
                Step::Stop => return,
                Step::RetryAfter(delay) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("Connect retry cancelled during backoff");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let proceed = self.hub.mutate("connection", |state| {
                        !token.is_cancelled()
                            && transition(state, ConnectionEvent::RetryScheduled)
                    });
                    if !proceed {
                        return;
                    }
                }
            }
        }
    }

    fn apply_handshake(&self, token: &CancellationToken, result: Result<(), ConnectError>) -> Step {
        self.hub.mutate("connection", |state| {
            if token.is_cancelled() {
                debug!("Discarding handshake result of cancelled attempt");
                return Step::Stop;
            }

            match result {
                Ok(()) => {
                    transition(state, ConnectionEvent::HandshakeSucceeded);
                    state.connection.attempt = 0;
                    state.connect_attempt = None;
                    if matches!(&state.playback.last_error, Some(e) if e.kind == ErrorKind::Connection)
                    {
                        state.playback.last_error = None;
                    }
                    // Same transaction as the status change
                    let replayed = self.dispatcher.replay_pending(state);
                    info!(replayed, "Connected to playback engine");
                    Step::Stop
                }
                Err(err) => {
                    state.connection.attempt += 1;
                    transition(state, ConnectionEvent::HandshakeFailed);
                    let attempt = state.connection.attempt;
                    state.playback.last_error = Some(Error::from(err.clone()).to_error_info());

                    if self.policy.should_retry(attempt) {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = time::as_millis_u64(delay),
                            error = %err,
                            "Handshake failed, retrying"
                        );
                        Step::RetryAfter(delay)
                    } else {
                        error!(
                            attempt,
                            error = %err,
                            "Handshake failed, giving up until reconnect"
                        );
                        state.connect_attempt = None;
                        Step::Stop
                    }
                }
            }
        })
    }
}

/// Applies engine-reported events to the hub
pub struct EngineWatcher {
    hub: Arc<StateHub>,
    events: broadcast::Receiver<EngineEvent>,
}

impl EngineWatcher {
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => event,
            };

            match event {
                Ok(event) => self.apply(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Engine event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Engine event channel closed");
                    break;
                }
            }
        }
    }

    fn apply(&self, event: EngineEvent) {
        self.hub.mutate("engine", |state| match event {
            EngineEvent::Disconnected { reason } => {
                if transition(state, ConnectionEvent::EngineDisconnected) {
                    warn!(%reason, "Playback engine disconnected");
                    state.playback.is_playing = false;
                }
            }
            EngineEvent::TrackLoaded { duration_ms } => {
                state.playback.duration_ms = duration_ms;
            }
            EngineEvent::PlaybackEnded => {
                state.playback.is_playing = false;
                state.playback.position_ms = state.playback.duration_ms;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory::ScriptedSession;
    use ConnectionEvent::*;
    use ConnectionStatus::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(next_status(Disconnected, ConnectRequested), Some(Connecting));
        assert_eq!(next_status(Connecting, HandshakeSucceeded), Some(Connected));
        assert_eq!(next_status(Connecting, HandshakeFailed), Some(Failed));
        assert_eq!(next_status(Failed, RetryScheduled), Some(Connecting));
        assert_eq!(next_status(Failed, ReconnectRequested), Some(Connecting));
        assert_eq!(next_status(Connected, EngineDisconnected), Some(Disconnected));
        assert_eq!(next_status(Connected, DisconnectRequested), Some(Disconnected));
    }

    #[test]
    fn test_connect_is_idempotent_in_table() {
        assert_eq!(next_status(Connecting, ConnectRequested), None);
        assert_eq!(next_status(Connected, ConnectRequested), None);
        assert_eq!(next_status(Failed, ConnectRequested), None);
        assert_eq!(next_status(Connected, ReconnectRequested), None);
        assert_eq!(next_status(Disconnected, EngineDisconnected), None);
        assert_eq!(next_status(Disconnected, HandshakeSucceeded), None);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(10), 5);
        let delays: Vec<u64> = (1..=7).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);

        // Huge attempt counts saturate instead of overflowing
        assert_eq!(policy.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    fn manager(session: Arc<ScriptedSession>) -> (Arc<StateHub>, ConnectionManager) {
        let hub = StateHub::new();
        let (dispatcher, executor) = CommandDispatcher::new(hub.clone(), session.clone());
        let shutdown = CancellationToken::new();
        tokio::spawn(executor.run(shutdown.clone()));
        let manager = ConnectionManager::new(
            hub.clone(),
            session,
            Arc::new(dispatcher),
            RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 3),
            shutdown,
        );
        (hub, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds() {
        let session = Arc::new(ScriptedSession::new());
        let (hub, manager) = manager(session.clone());

        assert!(manager.connect());
        assert_eq!(manager.status(), Connecting);
        assert!(!manager.connect(), "connect while connecting is a no-op");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = hub.current_snapshot();
        assert_eq!(snapshot.connection.status, Connected);
        assert_eq!(snapshot.connection.attempt, 0);
        assert_eq!(session.connect_attempts(), 1);
        assert!(!manager.connect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_in_flight_attempt() {
        let session = Arc::new(ScriptedSession::new());
        session.set_connect_latency(Duration::from_secs(5));
        let (hub, manager) = manager(session.clone());

        manager.connect();
        tokio::time::sleep(Duration::from_secs(1)).await;
        manager.disconnect();
        assert_eq!(manager.status(), Disconnected);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hub.current_snapshot().connection.status, Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_events_apply() {
        let session = Arc::new(ScriptedSession::new());
        let (hub, manager) = manager(session.clone());
        let shutdown = CancellationToken::new();
        tokio::spawn(manager.engine_watcher().run(shutdown.clone()));

        manager.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.mutate("test", |s| s.playback.is_playing = true);

        session.emit(EngineEvent::TrackLoaded { duration_ms: 180_000 });
        session.emit(EngineEvent::Disconnected {
            reason: "engine restarted".to_string(),
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = hub.current_snapshot();
        assert_eq!(snapshot.playback.duration_ms, 180_000);
        assert!(!snapshot.playback.is_playing);
        assert_eq!(snapshot.connection.status, Disconnected);
        shutdown.cancel();
    }
}
