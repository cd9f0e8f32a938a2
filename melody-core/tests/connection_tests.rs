//! Integration tests for the session connection lifecycle
//!
//! Covers:
//! - Exponential backoff between automatic retries
//! - Retry cap: stays Failed until an explicit reconnect
//! - Reconnect/disconnect cancel an in-flight attempt
//! - Engine-reported disconnects
//!
//! All tests run with paused time; sleeps advance the clock deterministically.

mod helpers;

use std::time::Duration;

use helpers::{settle, test_config, track, Harness};
use melody_common::config::CoordinatorConfig;
use melody_common::events::{ConnectionStatus, ErrorKind};
use melody_common::UserIdentity;
use melody_core::ports::memory::SessionCall;
use melody_core::ports::EngineEvent;
use melody_core::Command;

/// base 100ms, cap 1s, 3 attempts, manual connect
fn retry_config() -> CoordinatorConfig {
    let mut config = test_config();
    config.connection.base_delay_ms = 100;
    config.connection.max_delay_ms = 1_000;
    config.connection.max_attempts = 3;
    config.connection.auto_connect = false;
    config
}

fn harness() -> Harness {
    Harness::with(retry_config(), UserIdentity::token("user-1"))
}

#[tokio::test(start_paused = true)]
async fn test_backoff_between_retries() {
    let h = harness();
    h.session.fail_next_connects(2);

    h.coordinator.connect();
    // t=0 first attempt fails, retry after 100ms, then after 200ms
    settle(Duration::from_millis(50)).await;
    assert_eq!(h.session.connect_attempts(), 1);
    assert_eq!(h.coordinator.connection_status(), ConnectionStatus::Failed);

    settle(Duration::from_millis(100)).await; // t=150
    assert_eq!(h.session.connect_attempts(), 2);

    settle(Duration::from_millis(100)).await; // t=250
    assert_eq!(h.session.connect_attempts(), 2);

    settle(Duration::from_millis(150)).await; // t=400
    assert_eq!(h.session.connect_attempts(), 3);
    let snapshot = h.coordinator.current_snapshot();
    assert_eq!(snapshot.connection.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.connection.attempt, 0);
    assert!(snapshot.playback.last_error.is_none(), "success clears connection error");
}

#[tokio::test(start_paused = true)]
async fn test_observers_see_every_transition() {
    let h = harness();
    h.session.fail_next_connects(1);
    let mut sub = h.coordinator.subscribe();

    h.coordinator.connect();
    settle(Duration::from_secs(1)).await;

    let seen: Vec<(ConnectionStatus, u32)> = std::iter::from_fn(|| sub.try_next())
        .map(|s| (s.connection.status, s.connection.attempt))
        .collect();
    assert_eq!(
        seen,
        vec![
            (ConnectionStatus::Connecting, 0),
            (ConnectionStatus::Failed, 1),
            (ConnectionStatus::Connecting, 1),
            (ConnectionStatus::Connected, 0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_cap_leaves_failed_until_reconnect() {
    let h = harness();
    h.session.fail_next_connects(100);

    h.coordinator.connect();
    settle(Duration::from_secs(30)).await;

    let snapshot = h.coordinator.current_snapshot();
    assert_eq!(snapshot.connection.status, ConnectionStatus::Failed);
    assert_eq!(snapshot.connection.attempt, 3);
    assert_eq!(h.session.connect_attempts(), 3);
    assert_eq!(snapshot.playback.last_error.unwrap().kind, ErrorKind::Connection);

    // No automatic retry, and connect() does not restart a failed session
    settle(Duration::from_secs(60)).await;
    assert!(!h.coordinator.connect());
    settle(Duration::from_secs(1)).await;
    assert_eq!(h.session.connect_attempts(), 3);

    h.session.fail_next_connects(0);
    assert!(h.coordinator.reconnect());
    let snapshot = h.coordinator.current_snapshot();
    assert_eq!(snapshot.connection.status, ConnectionStatus::Connecting);
    assert_eq!(snapshot.connection.attempt, 0);

    settle(Duration::from_millis(10)).await;
    assert_eq!(h.coordinator.connection_status(), ConnectionStatus::Connected);
    assert_eq!(h.session.connect_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_cancels_in_flight_attempt() {
    let h = harness();
    h.session.set_connect_latency(Duration::from_secs(5));
    let mut sub = h.coordinator.subscribe();

    h.coordinator.connect();
    settle(Duration::from_secs(1)).await;
    assert!(h.coordinator.reconnect());

    settle(Duration::from_secs(10)).await;
    assert_eq!(h.session.connect_attempts(), 2);

    let connected = std::iter::from_fn(|| sub.try_next())
        .filter(|s| s.connection.status == ConnectionStatus::Connected)
        .count();
    assert_eq!(connected, 1, "cancelled attempt never publishes");
    assert!(!h.coordinator.reconnect(), "reconnect while connected is a no-op");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_stops_retries() {
    let h = harness();
    h.session.fail_next_connects(100);

    h.coordinator.connect();
    settle(Duration::from_millis(10)).await;
    assert_eq!(h.coordinator.connection_status(), ConnectionStatus::Failed);

    h.coordinator.disconnect();
    settle(Duration::from_secs(10)).await;
    assert_eq!(h.coordinator.connection_status(), ConnectionStatus::Disconnected);
    assert_eq!(h.session.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_engine_disconnect_then_commands_queue_again() {
    let h = harness();
    let c = &h.coordinator;

    c.connect();
    settle(Duration::from_millis(10)).await;
    c.dispatch(Command::Play(track("a"))).unwrap();
    c.settled().await;

    h.session.emit(EngineEvent::TrackLoaded { duration_ms: 200_000 });
    h.session.emit(EngineEvent::Disconnected {
        reason: "engine process exited".to_string(),
    });
    settle(Duration::from_millis(10)).await;

    let snapshot = c.current_snapshot();
    assert_eq!(snapshot.connection.status, ConnectionStatus::Disconnected);
    assert_eq!(snapshot.playback.duration_ms, 200_000);
    assert!(!snapshot.playback.is_playing);

    c.dispatch(Command::SeekTo(60_000)).unwrap();
    c.dispatch(Command::Resume).unwrap();
    c.settled().await;
    assert_eq!(h.session.command_calls(), vec![SessionCall::Play("a".to_string())]);

    c.connect();
    settle(Duration::from_millis(10)).await;
    c.settled().await;
    assert_eq!(
        h.session.command_calls(),
        vec![
            SessionCall::Play("a".to_string()),
            SessionCall::SeekTo(60_000),
            SessionCall::Resume,
        ]
    );
    assert!(c.current_snapshot().playback.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_playback_ended_event() {
    let h = harness();
    let c = &h.coordinator;
    c.connect();
    settle(Duration::from_millis(10)).await;
    c.dispatch(Command::Play(track("a"))).unwrap();
    h.session.emit(EngineEvent::TrackLoaded { duration_ms: 90_000 });
    h.session.emit(EngineEvent::PlaybackEnded);
    settle(Duration::from_millis(10)).await;

    let playback = c.current_snapshot().playback;
    assert!(!playback.is_playing);
    assert_eq!(playback.position_ms, 90_000);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_background_work() {
    let h = harness();
    h.session.fail_next_connects(100);
    h.coordinator.connect();
    settle(Duration::from_millis(10)).await;

    h.coordinator.shutdown().await;
    settle(Duration::from_secs(30)).await;
    assert_eq!(h.session.connect_attempts(), 1, "pending retry cancelled");

    // Dispatch after shutdown degrades to a no-op instead of hanging
    h.coordinator.dispatch(Command::Pause).unwrap();
    h.coordinator.settled().await;
    assert!(h.session.command_calls().is_empty());
}
