//! Liked-track bookkeeping kept inside the hub state
//!
//! `confirmed` is the id set of the latest remote emission. `pending` is the
//! one optimistic toggle not yet confirmed. A remote emission always wins:
//! it replaces `confirmed` and drops `pending`.

use std::collections::HashSet;

use crate::state::HubState;

/// Optimistic like/unlike awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToggle {
    pub track_id: String,
    /// Value shown while waiting
    pub desired: bool,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct LikeLedger {
    confirmed: HashSet<String>,
    pending: Option<PendingToggle>,
    next_seq: u64,
    emissions: u64,
}

impl LikeLedger {
    /// Present in the latest remote emission
    pub fn is_confirmed(&self, track_id: &str) -> bool {
        self.confirmed.contains(track_id)
    }

    /// Value to show for `track_id`, including an unconfirmed toggle
    pub fn is_liked(&self, track_id: &str) -> bool {
        match &self.pending {
            Some(pending) if pending.track_id == track_id => pending.desired,
            _ => self.is_confirmed(track_id),
        }
    }

    /// Replace the confirmed set with a remote emission
    pub fn confirm(&mut self, ids: impl IntoIterator<Item = String>) {
        self.confirmed = ids.into_iter().collect();
        self.pending = None;
        self.emissions += 1;
    }

    /// Record an optimistic toggle; supersedes any earlier pending toggle
    pub fn begin(&mut self, track_id: &str, desired: bool) -> PendingToggle {
        self.next_seq += 1;
        let pending = PendingToggle {
            track_id: track_id.to_string(),
            desired,
            seq: self.next_seq,
        };
        self.pending = Some(pending.clone());
        pending
    }

    pub fn pending(&self) -> Option<&PendingToggle> {
        self.pending.as_ref()
    }

    /// Drop the pending toggle if it is still `seq`
    ///
    /// Returns false when an emission or a newer toggle already replaced it.
    pub fn abandon(&mut self, seq: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.seq == seq => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Remote emissions applied so far
    pub fn emissions(&self) -> u64 {
        self.emissions
    }

    pub fn confirmed_len(&self) -> usize {
        self.confirmed.len()
    }
}

/// Recompute `is_liked` for the current track from the ledger
pub(crate) fn reconcile(state: &mut HubState) {
    let liked = state
        .playback
        .current_track_id()
        .map(|id| state.likes.is_liked(id))
        .unwrap_or(false);
    state.playback.is_liked = liked;
}
