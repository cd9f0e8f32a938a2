//! Home screen recommendations
//!
//! Loads the trending list through the search backend on demand. A refresh
//! cancels the load it supersedes; a response is applied only if it belongs
//! to the latest refresh.

use std::sync::{Arc, Mutex, MutexGuard};

use melody_common::config::HomeConfig;
use melody_common::events::RecommendationsView;
use melody_common::{time, TrackRef};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::notify::Notifier;
use crate::ports::SearchBackend;

#[derive(Default)]
struct Generation {
    latest: u64,
    in_flight: Option<CancellationToken>,
}

pub struct RecommendationsLoader {
    backend: Arc<dyn SearchBackend>,
    notifier: Notifier,
    query: String,
    generation: Mutex<Generation>,
    view: watch::Sender<RecommendationsView>,
    shutdown: CancellationToken,
}

impl RecommendationsLoader {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        notifier: Notifier,
        config: &HomeConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (view, _) = watch::channel(RecommendationsView::default());
        Arc::new(Self {
            backend,
            notifier,
            query: config.trending_query.clone(),
            generation: Mutex::new(Generation::default()),
            view,
            shutdown,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        self.generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new load, cancelling any load still in flight
    pub fn refresh(self: &Arc<Self>) -> u64 {
        let mut generation = self.lock();
        generation.latest += 1;
        if let Some(previous) = generation.in_flight.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        generation.in_flight = Some(token.clone());
        let current = generation.latest;
        self.view.send_modify(|view| {
            view.is_loading = true;
            view.error = None;
        });
        drop(generation);

        debug!(generation = current, query = %self.query, "Loading recommendations");
        let loader = Arc::clone(self);
        tokio::spawn(async move { loader.load(current, token).await });
        current
    }

    async fn load(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, "Recommendations load cancelled");
                return;
            }
            result = self.backend.search(&self.query) => result,
        };
        self.apply(generation, result);
    }

    /// Apply the result of load `generation`; stale results are dropped
    pub fn apply(&self, generation: u64, result: Result<Vec<TrackRef>, SearchError>) -> bool {
        let mut current = self.lock();
        if generation != current.latest {
            debug!(generation, latest = current.latest, "Discarding stale recommendations");
            return false;
        }
        current.in_flight = None;

        match result {
            Ok(tracks) => {
                let count = tracks.len();
                self.view.send_replace(RecommendationsView {
                    tracks,
                    is_loading: false,
                    error: None,
                    loaded_at: Some(time::now()),
                });
                drop(current);
                info!(count, "Recommendations loaded");
                self.notifier.info(format!("Loaded {} trending songs!", count));
            }
            Err(err) => {
                self.view.send_modify(|view| {
                    view.is_loading = false;
                    view.error = Some(err.to_string());
                });
                drop(current);
                warn!(error = %err, "Recommendations load failed");
                self.notifier.error("Failed to load songs");
            }
        }
        true
    }

    pub fn view(&self) -> RecommendationsView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecommendationsView> {
        self.view.subscribe()
    }
}
