//! Coordinator started against in-memory ports with test timings

use std::sync::Arc;
use std::time::Duration;

use melody_common::config::CoordinatorConfig;
use melody_common::UserIdentity;
use melody_core::ports::memory::{demo_catalog, CatalogSearch, MemoryLibrary, ScriptedSession, StaticAuth};
use melody_core::{Coordinator, Ports};

pub struct Harness {
    pub coordinator: Coordinator,
    pub session: Arc<ScriptedSession>,
    pub library: Arc<MemoryLibrary>,
    pub search: Arc<CatalogSearch>,
    pub auth: Arc<StaticAuth>,
}

impl Harness {
    /// Signed-in user, default timings, background loads disabled
    pub fn new() -> Self {
        Self::with(test_config(), UserIdentity::token("user-1"))
    }

    pub fn with(config: CoordinatorConfig, identity: UserIdentity) -> Self {
        let session = Arc::new(ScriptedSession::new());
        let auth = Arc::new(StaticAuth::new(identity));
        let library = Arc::new(MemoryLibrary::new(auth.clone()));
        let search = Arc::new(CatalogSearch::new(demo_catalog()));

        let ports = Ports {
            session: session.clone(),
            library: library.clone(),
            search: search.clone(),
            auth: auth.clone(),
        };

        Self {
            coordinator: Coordinator::start(config, ports),
            session,
            library,
            search,
            auth,
        }
    }
}

/// Defaults with position polling and the startup recommendations load off
/// so tests control `position_ms` and every search call
pub fn test_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.playback.position_poll_interval_ms = 0;
    config.home.load_on_start = false;
    config
}

/// Let spawned tasks run; with paused time this also advances the clock
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}
