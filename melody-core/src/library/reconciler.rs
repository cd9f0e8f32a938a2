//! Library reconciliation engine
//!
//! Keeps `PlaybackState::is_liked` in line with the remote liked-tracks
//! stream for whichever track is current.
//!
//! - Each stream emission replaces the confirmed set and recomputes
//!   `is_liked` in one hub transaction. The hub publishes only if the value
//!   changed.
//! - `toggle_like` flips `is_liked` optimistically and writes to the store.
//!   The next emission confirms or corrects it. A failed write reverts
//!   at once; a write whose effect never shows up in the stream is reverted
//!   after the settle timeout.
//! - The stream follows the signed-in identity: an identity change restarts
//!   it, signing out empties the library.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use melody_common::config::LibraryConfig;
use melody_common::events::{ErrorKind, LibraryView};
use melody_common::{time, LikedTrack, TrackRef};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::{reconcile, PendingToggle};
use crate::error::{Error, LibraryError};
use crate::notify::Notifier;
use crate::ports::{AuthProvider, LibraryStore};
use crate::state::StateHub;

enum StreamOutcome {
    IdentityChanged,
    Failed(LibraryError),
    Ended,
}

pub struct LibraryReconciler {
    hub: Arc<StateHub>,
    store: Arc<dyn LibraryStore>,
    auth: Arc<dyn AuthProvider>,
    notifier: Notifier,
    view: watch::Sender<LibraryView>,
    settle_timeout: Duration,
    resubscribe_delay: Duration,
    shutdown: CancellationToken,
}

impl LibraryReconciler {
    pub fn new(
        hub: Arc<StateHub>,
        store: Arc<dyn LibraryStore>,
        auth: Arc<dyn AuthProvider>,
        notifier: Notifier,
        config: &LibraryConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (view, _) = watch::channel(LibraryView::default());
        Arc::new(Self {
            hub,
            store,
            auth,
            notifier,
            view,
            settle_timeout: config.settle_timeout(),
            resubscribe_delay: config.resubscribe_delay(),
            shutdown,
        })
    }

    /// Latest reconciled liked-tracks list
    pub fn library(&self) -> watch::Receiver<LibraryView> {
        self.view.subscribe()
    }

    /// Flip like on the current track and write the change to the store
    ///
    /// Without an authenticated identity the store is never called: the
    /// caller gets [`LibraryError::NotAuthenticated`] and `last_error` is set.
    /// Without a current track this is a no-op.
    pub fn toggle_like(self: &Arc<Self>) -> Result<(), LibraryError> {
        if let Err(auth_err) = self.auth.require_authenticated() {
            let err = LibraryError::from(auth_err);
            self.notifier.error(format!("Action failed: {}", err));
            let info = Error::from(err.clone()).to_error_info();
            self.hub
                .mutate("library", |state| state.playback.last_error = Some(info));
            return Err(err);
        }

        let toggle = self.hub.mutate("library", |state| {
            let track = state.playback.current_track.clone()?;
            let desired = !state.playback.is_liked;
            let pending = state.likes.begin(&track.id, desired);
            state.playback.is_liked = desired;
            Some((track, pending))
        });

        let Some((track, pending)) = toggle else {
            debug!("Toggle like ignored, nothing playing");
            return Ok(());
        };

        debug!(track = %track.id, liked = pending.desired, seq = pending.seq, "Optimistic like toggle");
        let reconciler = Arc::clone(self);
        tokio::spawn(async move { reconciler.complete_toggle(track, pending).await });
        Ok(())
    }

    async fn complete_toggle(self: Arc<Self>, track: TrackRef, pending: PendingToggle) {
        let result = if pending.desired {
            self.store
                .save(&LikedTrack::from_track(&track, time::now()))
                .await
        } else {
            self.store.remove(&track.id).await
        };

        match result {
            Ok(()) => {
                if pending.desired {
                    self.notifier.info(format!("Added to Library: {}", track.title));
                } else {
                    self.notifier.info(format!("Removed from Library: {}", track.title));
                }
                self.hub.mutate("library", |state| {
                    if matches!(&state.playback.last_error, Some(e) if e.kind == ErrorKind::Library) {
                        state.playback.last_error = None;
                    }
                });

                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.settle_timeout) => {
                        self.revert_if_pending(&pending, None);
                    }
                }
            }
            Err(err) => {
                warn!(track = %track.id, error = %err, "Library write failed");
                self.notifier.error(format!("Action failed: {}", err));
                self.revert_if_pending(&pending, Some(err));
            }
        }
    }

    /// Fall back to the confirmed value unless an emission or a newer
    /// toggle already settled it
    fn revert_if_pending(&self, pending: &PendingToggle, err: Option<LibraryError>) {
        self.hub.mutate("library", |state| {
            if state.likes.abandon(pending.seq) {
                if err.is_none() {
                    warn!(
                        track = %pending.track_id,
                        timeout_ms = time::as_millis_u64(self.settle_timeout),
                        "No confirming emission, reverting like"
                    );
                }
                reconcile(state);
            }
            if let Some(err) = err {
                state.playback.last_error = Some(Error::from(err).to_error_info());
            }
        });
    }

    /// Apply one remote emission
    pub fn apply_emission(&self, tracks: Vec<LikedTrack>) {
        let count = tracks.len();
        self.hub.mutate("library", |state| {
            state.likes.confirm(tracks.iter().map(|t| t.id.clone()));
            reconcile(state);
        });
        debug!(count, "Applied liked-tracks emission");
        self.view.send_replace(LibraryView {
            tracks,
            is_loading: false,
            error: None,
        });
    }

    /// Consume the liked-tracks stream until shutdown
    pub async fn run(self: Arc<Self>) {
        let mut identity = self.auth.identity();
        let mut identity_open = true;

        loop {
            let current = identity.borrow_and_update().clone();

            if !current.is_authenticated() {
                info!("No authenticated identity, library is empty");
                self.apply_emission(Vec::new());
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    changed = identity.changed(), if identity_open => {
                        identity_open = changed.is_ok();
                    }
                }
                if !identity_open {
                    // Identity can never change again
                    self.shutdown.cancelled().await;
                    return;
                }
                continue;
            }

            info!(user = current.user_id.as_deref().unwrap_or_default(), mode = ?current.mode, "Subscribing to liked tracks");
            self.view.send_modify(|view| view.is_loading = true);
            let mut stream = self.store.stream_liked_tracks();

            let outcome = loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    changed = identity.changed(), if identity_open => {
                        if changed.is_ok() {
                            break StreamOutcome::IdentityChanged;
                        }
                        identity_open = false;
                    }
                    item = stream.next() => match item {
                        Some(Ok(tracks)) => self.apply_emission(tracks),
                        Some(Err(err)) => break StreamOutcome::Failed(err),
                        None => break StreamOutcome::Ended,
                    },
                }
            };
            drop(stream);

            match outcome {
                StreamOutcome::IdentityChanged => {
                    info!("Identity changed, restarting liked-tracks stream");
                    continue;
                }
                StreamOutcome::Failed(err) => {
                    warn!(error = %err, "Liked-tracks stream failed");
                    self.notifier.error(format!("Library sync failed: {}", err));
                    self.view.send_modify(|view| {
                        view.is_loading = false;
                        view.error = Some(err.to_string());
                    });
                }
                StreamOutcome::Ended => {
                    warn!("Liked-tracks stream ended");
                }
            }

            debug!(
                delay_ms = time::as_millis_u64(self.resubscribe_delay),
                "Resubscribing to liked tracks"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
                changed = identity.changed(), if identity_open => {
                    identity_open = changed.is_ok();
                }
            }
        }
    }
}
