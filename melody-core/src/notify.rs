//! Transient user notifications
//!
//! One-shot messages ("Added to Library: ...", "Action failed: ...") shown
//! briefly by the surrounding UI. Delivery is lossy: a lagging or absent
//! listener misses notifications, never state.

use melody_common::events::Notification;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcasts [`Notification`]s to every current listener
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    capacity: usize,
}

impl Notifier {
    /// Creates a notifier buffering up to `capacity` undelivered messages
    ///
    /// A capacity of 0 is raised to 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use melody_core::notify::Notifier;
    ///
    /// let notifier = Notifier::new(16);
    /// let mut rx = notifier.subscribe();
    /// notifier.info("Added to Library: Melodic Monsoon");
    /// assert_eq!(rx.try_recv().unwrap().message, "Added to Library: Melodic Monsoon");
    /// ```
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receive notifications emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Notification::info(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let notification = Notification::error(message);
        warn!(message = %notification.message, "Error notification");
        self.emit(notification);
    }

    /// Returns the number of listeners reached
    pub fn emit(&self, notification: Notification) -> usize {
        match self.tx.send(notification) {
            Ok(listeners) => listeners,
            Err(broadcast::error::SendError(notification)) => {
                debug!(message = %notification.message, "No notification listeners");
                0
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
