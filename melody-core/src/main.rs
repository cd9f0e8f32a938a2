//! Melody coordinator (melody-core) - demo entry point
//!
//! Runs the coordinator against the in-memory ports and replays a command
//! script, logging every published snapshot and notification.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use melody_common::config::{resolve_config_path, CoordinatorConfig, CONFIG_ENV_VAR};
use melody_common::UserIdentity;
use melody_core::ports::memory::{demo_catalog, CatalogSearch, MemoryLibrary, ScriptedSession, StaticAuth};
use melody_core::{Command, Coordinator, Ports};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for melody-core
#[derive(Parser, Debug)]
#[command(name = "melody-core")]
#[command(about = "Streaming playback coordinator (scripted demo)")]
#[command(version)]
struct Args {
    /// Config file (overrides MELODY_CONFIG and the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (overrides [logging] level)
    #[arg(long)]
    log_level: Option<String>,

    /// Number of initial handshakes the scripted engine refuses
    #[arg(long, default_value = "0")]
    connect_failures: u32,

    /// JSON file holding a list of commands to replay
    #[arg(long)]
    script: Option<PathBuf>,

    /// Search catalog as a JSON array of backend music items
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Pause between scripted commands
    #[arg(long, default_value = "100")]
    step_ms: u64,

    /// Signed-in user id (anonymous session when omitted)
    #[arg(long, env = "MELODY_USER")]
    user: Option<String>,

    /// Keep running after the script until Ctrl+C
    #[arg(long)]
    hold: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = CoordinatorConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("melody_core={level},melody_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Melody coordinator demo");
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let script = match &args.script {
        Some(path) => load_script(path)?,
        None => default_script(),
    };

    let identity = match &args.user {
        Some(user) => UserIdentity::token(user.clone()),
        None => UserIdentity::anonymous(None),
    };
    info!(user = identity.user_id.as_deref().unwrap_or_default(), mode = ?identity.mode, "Identity");

    let search = match &args.catalog {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog {}", path.display()))?;
            CatalogSearch::from_json(&json)
                .with_context(|| format!("Invalid catalog {}", path.display()))?
        }
        None => CatalogSearch::new(demo_catalog()),
    };

    let session = Arc::new(ScriptedSession::new());
    session.fail_next_connects(args.connect_failures);
    let auth = Arc::new(StaticAuth::new(identity));
    let ports = Ports {
        session,
        library: Arc::new(MemoryLibrary::new(auth.clone())),
        search: Arc::new(search),
        auth,
    };

    let coordinator = Coordinator::start(config, ports);
    spawn_observers(&coordinator);

    for command in script {
        if let Err(e) = coordinator.dispatch(command) {
            warn!(error = %e, "Command failed");
        }
        tokio::time::sleep(Duration::from_millis(args.step_ms)).await;
    }

    // Let the last search debounce and any queued commands finish
    tokio::time::sleep(coordinator.config().search.debounce() + Duration::from_millis(100)).await;
    coordinator.settled().await;

    let snapshot = coordinator.current_snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?
    );
    let search = coordinator.search_state();
    info!(query = %search.query, results = search.results.len(), "Final search state");
    let home = coordinator.recommendations().borrow().clone();
    info!(tracks = home.tracks.len(), error = ?home.error, "Final recommendations");

    if args.hold {
        info!("Script finished, press Ctrl+C to exit");
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
        }
    }

    coordinator.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

fn load_script(path: &Path) -> Result<Vec<Command>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid script {}", path.display()))
}

fn default_script() -> Vec<Command> {
    let catalog = demo_catalog();
    let mut script = vec![
        Command::SetSearchQuery("me".to_string()),
        Command::SetSearchQuery("melo".to_string()),
    ];
    if let Some(track) = catalog.into_iter().next() {
        script.push(Command::Play(track));
    }
    script.extend([
        Command::SeekTo(30_000),
        Command::ToggleLike,
        Command::TogglePlayback,
    ]);
    script
}

fn spawn_observers(coordinator: &Coordinator) {
    let (initial, mut updates, _handle) = coordinator.subscribe().into_parts();
    info!(revision = initial.revision, status = %initial.connection.status, "Observer subscribed");
    tokio::spawn(async move {
        use tokio_stream::StreamExt;
        while let Some(snapshot) = updates.next().await {
            info!(
                revision = snapshot.revision,
                status = %snapshot.connection.status,
                attempt = snapshot.connection.attempt,
                track = snapshot.playback.current_track_id().unwrap_or("-"),
                playing = snapshot.playback.is_playing,
                liked = snapshot.playback.is_liked,
                position_ms = snapshot.playback.position_ms,
                "Snapshot"
            );
        }
    });

    let mut notifications = coordinator.notifications();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => info!(level = ?notification.level, "{}", notification.message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed notifications");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
