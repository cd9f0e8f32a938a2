//! Playback commands
//!
//! A command changes `PlaybackState` optimistically in the same hub
//! transaction that hands it to the executor; the session confirms later.

use melody_common::events::PlaybackState;
use melody_common::TrackRef;
use serde::{Deserialize, Serialize};

use crate::state::HubState;

/// User intent targeting the playback session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PlaybackCommand {
    Play(TrackRef),
    Pause,
    Resume,
    SeekTo(u64),
    SkipNext,
}

impl PlaybackCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play(_) => "Play",
            PlaybackCommand::Pause => "Pause",
            PlaybackCommand::Resume => "Resume",
            PlaybackCommand::SeekTo(_) => "SeekTo",
            PlaybackCommand::SkipNext => "SkipNext",
        }
    }

    /// Apply the expected outcome before the engine confirms it
    pub(crate) fn apply_optimistic(&self, state: &mut HubState) {
        let likes = &state.likes;
        self.apply_to(&mut state.playback, |track_id| likes.is_liked(track_id));
    }

    pub(crate) fn apply_to(&self, playback: &mut PlaybackState, is_liked: impl Fn(&str) -> bool) {
        match self {
            PlaybackCommand::Play(track) => {
                playback.is_liked = is_liked(&track.id);
                playback.current_track = Some(track.clone());
                playback.is_playing = true;
                playback.position_ms = 0;
                playback.duration_ms = 0;
            }
            PlaybackCommand::Pause => {
                playback.is_playing = false;
            }
            PlaybackCommand::Resume => {
                // Nothing to resume without a track
                playback.is_playing = playback.current_track.is_some();
            }
            PlaybackCommand::SeekTo(position_ms) => {
                playback.position_ms = if playback.duration_ms > 0 {
                    (*position_ms).min(playback.duration_ms)
                } else {
                    *position_ms
                };
            }
            PlaybackCommand::SkipNext => {
                playback.position_ms = 0;
            }
        }
    }
}

impl std::fmt::Display for PlaybackCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackCommand::Play(track) => write!(f, "Play({})", track.id),
            PlaybackCommand::SeekTo(ms) => write!(f, "SeekTo({}ms)", ms),
            other => write!(f, "{}", other.name()),
        }
    }
}
