//! Pending command queue
//!
//! Holds commands issued while the session is not `Connected`, in issuance
//! order. Commands are never reordered or merged; the only pruning is that
//! enqueuing a `Play` discards everything queued before it, since those
//! commands target a track the new `Play` replaces.

use std::collections::VecDeque;

use melody_common::events::PlaybackState;
use tracing::debug;

use super::command::PlaybackCommand;

#[derive(Debug, Default)]
pub struct PendingCommands {
    queue: VecDeque<PlaybackCommand>,
}

impl PendingCommands {
    pub fn push(&mut self, command: PlaybackCommand) {
        if matches!(command, PlaybackCommand::Play(_)) && !self.queue.is_empty() {
            debug!(
                superseded = self.queue.len(),
                "Play supersedes queued commands"
            );
            self.queue.clear();
        }
        self.queue.push_back(command);
    }

    /// Remove and return every queued command in issuance order
    pub fn drain(&mut self) -> Vec<PlaybackCommand> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaybackCommand> {
        self.queue.iter()
    }

    /// Playback state once every queued command has replayed onto `current`
    pub fn project(&self, current: &PlaybackState) -> PlaybackState {
        let mut projected = current.clone();
        for command in &self.queue {
            command.apply_to(&mut projected, |_| false);
        }
        projected
    }
}
