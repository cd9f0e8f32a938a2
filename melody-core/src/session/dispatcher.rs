//! Playback command dispatcher
//!
//! **Purpose:** turn user intents into ordered operations on the session.
//!
//! - Connected: the optimistic state change and the hand-off to the executor
//!   happen in one hub transaction, so executor order equals apply order.
//! - Not connected: the command is queued (see `queue`). The connection
//!   manager replays the queue inside the same transaction that publishes
//!   `Connected`, so later commands can never overtake queued ones.
//!
//! A command rejected by the session is dropped and surfaced as
//! `last_error`; it is never retried.

use std::sync::Arc;

use melody_common::events::{ConnectionStatus, ErrorKind, PlaybackState};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::PlaybackCommand;
use crate::error::{CommandError, Error};
use crate::ports::PlaybackSession;
use crate::state::{HubState, StateHub};

/// What `dispatch` did with a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Applied optimistically and sent to the session
    Executed,
    /// Held until the session connects
    Queued,
}

enum SessionOp {
    Execute(PlaybackCommand),
    Barrier(oneshot::Sender<()>),
}

/// Accepts playback commands and routes them to the session or the queue
pub struct CommandDispatcher {
    hub: Arc<StateHub>,
    ops_tx: mpsc::UnboundedSender<SessionOp>,
}

impl CommandDispatcher {
    /// Create the dispatcher and the executor that must be run alongside it
    pub fn new(hub: Arc<StateHub>, session: Arc<dyn PlaybackSession>) -> (Self, CommandExecutor) {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let executor = CommandExecutor {
            hub: Arc::clone(&hub),
            session,
            ops_rx,
        };
        (Self { hub, ops_tx }, executor)
    }

    /// Execute now if connected, otherwise queue in issuance order
    pub fn dispatch(&self, command: PlaybackCommand) -> DispatchOutcome {
        self.dispatch_with(move |_| command)
    }

    /// Pause when playing, resume otherwise; decided in the same transaction
    ///
    /// While not connected the decision uses the state the queued commands
    /// will produce on replay, not the published one.
    pub fn toggle_playback(&self) -> DispatchOutcome {
        self.dispatch_with(|playback| {
            if playback.is_playing {
                PlaybackCommand::Pause
            } else {
                PlaybackCommand::Resume
            }
        })
    }

    fn dispatch_with(
        &self,
        choose: impl FnOnce(&PlaybackState) -> PlaybackCommand,
    ) -> DispatchOutcome {
        self.hub.mutate("dispatcher", |state| {
            let connected = state.connection.status == ConnectionStatus::Connected;
            let command = if connected || state.pending.is_empty() {
                choose(&state.playback)
            } else {
                choose(&state.pending.project(&state.playback))
            };
            if connected {
                debug!(%command, "Executing command");
                self.execute_now(state, command);
                DispatchOutcome::Executed
            } else {
                debug!(
                    %command,
                    status = %state.connection.status,
                    queued = state.pending.len() + 1,
                    "Session not connected, queueing command"
                );
                state.pending.push(command);
                DispatchOutcome::Queued
            }
        })
    }

    /// Replay queued commands in order; called inside the hub transaction
    /// that publishes `Connected`
    pub(crate) fn replay_pending(&self, state: &mut HubState) -> usize {
        let commands = state.pending.drain();
        let count = commands.len();
        for command in commands {
            self.execute_now(state, command);
        }
        if count > 0 {
            info!(count, "Replayed queued commands");
        }
        count
    }

    fn execute_now(&self, state: &mut HubState, command: PlaybackCommand) {
        command.apply_optimistic(state);
        if self.ops_tx.send(SessionOp::Execute(command)).is_err() {
            warn!("Command executor stopped, command not sent to session");
        }
    }

    /// Number of commands waiting for a connection
    pub fn pending_len(&self) -> usize {
        self.hub.read(|state| state.pending.len())
    }

    /// Resolves once every command handed to the executor before this call
    /// has been executed by the session
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        if self.ops_tx.send(SessionOp::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Executes session operations one at a time in hand-off order
pub struct CommandExecutor {
    hub: Arc<StateHub>,
    session: Arc<dyn PlaybackSession>,
    ops_rx: mpsc::UnboundedReceiver<SessionOp>,
}

impl CommandExecutor {
    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!("Command executor started");
        loop {
            let op = tokio::select! {
                _ = shutdown.cancelled() => break,
                op = self.ops_rx.recv() => op,
            };
            match op {
                Some(SessionOp::Execute(command)) => self.execute(command).await,
                Some(SessionOp::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => break,
            }
        }
        debug!("Command executor stopped");
    }

    async fn execute(&self, command: PlaybackCommand) {
        // The session may have dropped between hand-off and execution
        let connected = self
            .hub
            .read(|state| state.connection.status == ConnectionStatus::Connected);
        let result = if !connected {
            Err(CommandError::NotConnected)
        } else {
            match &command {
                PlaybackCommand::Play(track) => self.session.play(track).await,
                PlaybackCommand::Pause => self.session.pause().await,
                PlaybackCommand::Resume => self.session.resume().await,
                PlaybackCommand::SeekTo(position_ms) => self.session.seek_to(*position_ms).await,
                PlaybackCommand::SkipNext => self.session.skip_next().await,
            }
        };

        match result {
            Ok(()) => {
                // A later success clears a stale command failure
                self.hub.mutate("dispatcher", |state| {
                    if matches!(&state.playback.last_error, Some(e) if e.kind == ErrorKind::Command) {
                        state.playback.last_error = None;
                    }
                });
            }
            Err(err) => {
                warn!(%command, error = %err, "Command failed, dropping it");
                let info = Error::from(err).to_error_info();
                self.hub
                    .mutate("dispatcher", |state| state.playback.last_error = Some(info));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory::{ScriptedSession, SessionCall};
    use melody_common::TrackRef;

    fn setup() -> (Arc<StateHub>, Arc<ScriptedSession>, CommandDispatcher, CancellationToken) {
        let hub = StateHub::new();
        let session = Arc::new(ScriptedSession::new());
        let (dispatcher, executor) = CommandDispatcher::new(hub.clone(), session.clone());
        let shutdown = CancellationToken::new();
        tokio::spawn(executor.run(shutdown.clone()));
        (hub, session, dispatcher, shutdown)
    }

    fn force_connected(hub: &StateHub) {
        hub.mutate("test", |s| s.connection.status = ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_queues_while_disconnected() {
        let (hub, session, dispatcher, _shutdown) = setup();

        let outcome = dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        assert_eq!(outcome, DispatchOutcome::Queued);
        assert_eq!(dispatcher.pending_len(), 1);

        dispatcher.settled().await;
        assert!(session.command_calls().is_empty());
        // Nothing applied while queued
        assert!(hub.current_snapshot().playback.current_track.is_none());
    }

    #[tokio::test]
    async fn test_executes_when_connected() {
        let (hub, session, dispatcher, _shutdown) = setup();
        force_connected(&hub);

        let outcome = dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        assert_eq!(outcome, DispatchOutcome::Executed);
        // Optimistic state is visible before the session confirms
        assert!(hub.current_snapshot().playback.is_playing);

        dispatcher.dispatch(PlaybackCommand::SeekTo(42_000));
        dispatcher.settled().await;
        assert_eq!(
            session.command_calls(),
            vec![SessionCall::Play("a".to_string()), SessionCall::SeekTo(42_000)]
        );
    }

    #[tokio::test]
    async fn test_rejection_sets_last_error_and_next_success_clears_it() {
        let (hub, session, dispatcher, _shutdown) = setup();
        force_connected(&hub);
        session.reject("Pause");

        dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        dispatcher.dispatch(PlaybackCommand::Pause);
        dispatcher.settled().await;

        let error = hub.current_snapshot().playback.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::Command);
        assert!(error.message.contains("Pause"));

        session.accept_all();
        dispatcher.dispatch(PlaybackCommand::Resume);
        dispatcher.settled().await;
        assert!(hub.current_snapshot().playback.last_error.is_none());
        // Rejected command was not retried
        assert_eq!(session.command_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_command_after_session_dropped_reports_not_connected() {
        let (hub, session, dispatcher, _shutdown) = setup();
        force_connected(&hub);

        // Handed off while connected; executor runs only after the drop
        dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        hub.mutate("test", |s| s.connection.status = ConnectionStatus::Disconnected);
        dispatcher.settled().await;

        assert!(session.command_calls().is_empty());
        let error = hub.current_snapshot().playback.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::Command);
        assert!(error.message.contains("session not connected"));
    }

    #[tokio::test]
    async fn test_toggle_playback_uses_current_state() {
        let (hub, session, dispatcher, _shutdown) = setup();
        force_connected(&hub);

        dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        dispatcher.toggle_playback();
        assert!(!hub.current_snapshot().playback.is_playing);
        dispatcher.toggle_playback();
        assert!(hub.current_snapshot().playback.is_playing);

        dispatcher.settled().await;
        assert_eq!(
            session.command_calls(),
            vec![
                SessionCall::Play("a".to_string()),
                SessionCall::Pause,
                SessionCall::Resume
            ]
        );
    }

    #[tokio::test]
    async fn test_replay_pending_applies_in_order() {
        let (hub, session, dispatcher, _shutdown) = setup();
        dispatcher.dispatch(PlaybackCommand::Play(TrackRef::new("a", "A")));
        dispatcher.dispatch(PlaybackCommand::SeekTo(10_000));
        dispatcher.dispatch(PlaybackCommand::Pause);

        let replayed = hub.mutate("test", |state| {
            state.connection.status = ConnectionStatus::Connected;
            dispatcher.replay_pending(state)
        });
        assert_eq!(replayed, 3);

        let playback = hub.current_snapshot().playback;
        assert_eq!(playback.current_track_id(), Some("a"));
        assert_eq!(playback.position_ms, 10_000);
        assert!(!playback.is_playing);

        dispatcher.settled().await;
        assert_eq!(
            session.command_calls(),
            vec![
                SessionCall::Play("a".to_string()),
                SessionCall::SeekTo(10_000),
                SessionCall::Pause
            ]
        );
    }
}
