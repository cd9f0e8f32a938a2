//! Playback position polling
//!
//! While the session is connected and playing, asks the engine for the
//! current position every tick and writes it to `PlaybackState`.

use std::sync::Arc;
use std::time::Duration;

use melody_common::events::ConnectionStatus;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ports::PlaybackSession;
use crate::state::StateHub;

pub struct PositionPoller {
    hub: Arc<StateHub>,
    session: Arc<dyn PlaybackSession>,
    period: Duration,
}

impl PositionPoller {
    /// A zero `period` disables polling
    pub fn new(hub: Arc<StateHub>, session: Arc<dyn PlaybackSession>, period: Duration) -> Self {
        Self {
            hub,
            session,
            period,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if self.period.is_zero() {
            info!("Position polling disabled by configuration");
            return;
        }

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            // Only poll during active playback
            let polled_track = self.hub.read(|state| {
                let active = state.connection.status == ConnectionStatus::Connected
                    && state.playback.is_playing;
                active
                    .then(|| state.playback.current_track_id().map(str::to_string))
                    .flatten()
            });
            let Some(track_id) = polled_track else {
                continue;
            };

            let position_ms = match self.session.current_position_ms().await {
                Ok(position_ms) => position_ms,
                Err(e) => {
                    debug!(error = %e, "Position poll failed");
                    continue;
                }
            };

            self.hub.mutate("position", |state| {
                // The track may have changed while the poll was in flight
                let playback = &mut state.playback;
                if playback.is_playing && playback.current_track_id() == Some(track_id.as_str()) {
                    playback.position_ms = if playback.duration_ms > 0 {
                        position_ms.min(playback.duration_ms)
                    } else {
                        position_ms
                    };
                }
            });
        }
        debug!("Position poller stopped");
    }
}
