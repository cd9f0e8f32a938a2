//! State broadcast hub
//!
//! Single owner of the live `PlaybackState`/`SessionConnection` pair.
//!
//! **Write path:** every mutation runs as a closure under one lock
//! ([`StateHub::mutate`]). Closures never await, so a suspended port call can
//! never hold the queue. When a closure changes the observable state, the
//! hub bumps the revision and hands the new snapshot to every subscriber
//! before releasing the lock, so all observers see updates in apply order.
//!
//! **Read path:** [`StateHub::subscribe`] registers an unbounded channel and
//! returns the current snapshot atomically with the registration.
//! [`StateHub::current_snapshot`] reads the latest published snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use melody_common::events::{PlaybackState, SessionConnection, Snapshot};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::library::ledger::LikeLedger;
use crate::session::queue::PendingCommands;

/// Mutable state owned by the hub
///
/// Only `playback` and `connection` are published. The other fields are
/// bookkeeping that must change in the same transaction as the published
/// state (queued commands drained on connect, the liked set used when the
/// current track changes, the in-flight connect attempt).
#[derive(Debug, Default)]
pub struct HubState {
    pub playback: PlaybackState,
    /// Written only by `session::connection`
    pub(crate) connection: SessionConnection,
    pub(crate) pending: PendingCommands,
    pub(crate) likes: LikeLedger,
    pub(crate) connect_attempt: Option<CancellationToken>,
}

impl HubState {
    pub fn connection(&self) -> SessionConnection {
        self.connection
    }
}

struct Inner {
    state: HubState,
    published: Snapshot,
    next_subscriber_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Snapshot>>,
}

/// Single source of truth for playback/session state
pub struct StateHub {
    inner: Mutex<Inner>,
    latest: watch::Sender<Snapshot>,
}

impl StateHub {
    /// Create hub with `currentTrack = None` and a disconnected session
    pub fn new() -> Arc<Self> {
        let (latest, _) = watch::channel(Snapshot::default());
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: HubState::default(),
                published: Snapshot::default(),
                next_subscriber_id: 0,
                subscribers: HashMap::new(),
            }),
            latest,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoned: state is as of the panicking writer's last assignment
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one serialized mutation
    ///
    /// Publishes a new snapshot only when `playback` or `connection`
    /// actually changed. `f` must not call back into the hub.
    pub fn mutate<R>(&self, source: &'static str, f: impl FnOnce(&mut HubState) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner.state);

        let changed = inner.state.playback != inner.published.playback
            || inner.state.connection != inner.published.connection;
        if changed {
            let snapshot = Snapshot {
                revision: inner.published.revision + 1,
                playback: inner.state.playback.clone(),
                connection: inner.state.connection,
            };
            trace!(source, revision = snapshot.revision, "Publishing snapshot");

            inner.subscribers.retain(|id, tx| {
                let delivered = tx.send(snapshot.clone()).is_ok();
                if !delivered {
                    debug!(subscriber = id, "Dropping closed subscriber");
                }
                delivered
            });
            self.latest.send_replace(snapshot.clone());
            inner.published = snapshot;
        }

        result
    }

    /// Read hub state without mutating it
    pub fn read<R>(&self, f: impl FnOnce(&HubState) -> R) -> R {
        let inner = self.lock();
        f(&inner.state)
    }

    /// Latest published snapshot (non-blocking)
    pub fn current_snapshot(&self) -> Snapshot {
        self.latest.borrow().clone()
    }

    /// Latest-value view of the snapshot; intermediate updates may be skipped
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.latest.subscribe()
    }

    /// Register an observer
    ///
    /// The returned snapshot is the state at registration; every later
    /// update is delivered through `updates` in apply order.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.insert(id, tx);
        debug!(subscriber = id, total = inner.subscribers.len(), "Observer subscribed");

        Subscription {
            snapshot: inner.published.clone(),
            updates: rx,
            handle: SubscriptionHandle {
                id,
                hub: Arc::downgrade(self),
            },
        }
    }

    /// Number of registered observers
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Observer unsubscribed");
        }
        removed
    }
}

/// Observer registration returned by [`StateHub::subscribe`]
pub struct Subscription {
    /// State at the moment of subscription
    pub snapshot: Snapshot,
    /// Every update applied after `snapshot`
    pub updates: mpsc::UnboundedReceiver<Snapshot>,
    pub handle: SubscriptionHandle,
}

impl Subscription {
    /// Next update, or `None` once unsubscribed and drained
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.updates.recv().await
    }

    /// Buffered update if one is ready
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.updates.try_recv().ok()
    }

    /// Split into the initial snapshot, an update stream and the handle
    pub fn into_parts(self) -> (Snapshot, UnboundedReceiverStream<Snapshot>, SubscriptionHandle) {
        (
            self.snapshot,
            UnboundedReceiverStream::new(self.updates),
            self.handle,
        )
    }
}

/// Handle that removes an observer from the hub
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    hub: Weak<StateHub>,
}

impl SubscriptionHandle {
    /// Stop receiving updates. Returns false if already unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.unsubscribe(self.id),
            None => false,
        }
    }
}
