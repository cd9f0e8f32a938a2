//! Search query coordinator
//!
//! Every text edit gets the next sequence number and cancels whatever the
//! previous edit started (debounce timer or in-flight request). Edits
//! shorter than the minimum length clear the results without a request.
//! Longer edits wait out the debounce window, then call the backend.
//!
//! A response is applied only if its sequence is still the latest issued
//! one; this check and every state write happen under the same lock, so an
//! older response can never overwrite a newer one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use melody_common::config::SearchConfig;
use melody_common::events::{SearchQuery, SearchState};
use melody_common::{time, TrackRef};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::ports::SearchBackend;

#[derive(Default)]
struct Issued {
    latest: u64,
    in_flight: Option<CancellationToken>,
}

pub struct SearchCoordinator {
    backend: Arc<dyn SearchBackend>,
    issued: Mutex<Issued>,
    state: watch::Sender<SearchState>,
    debounce: Duration,
    min_query_len: usize,
    shutdown: CancellationToken,
}

impl SearchCoordinator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        config: &SearchConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SearchState::default());
        Arc::new(Self {
            backend,
            issued: Mutex::new(Issued::default()),
            state,
            debounce: config.debounce(),
            min_query_len: config.min_query_len,
            shutdown,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Issued> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle one edit of the query text
    pub fn set_query(self: &Arc<Self>, text: impl Into<String>) -> SearchQuery {
        let text = text.into();
        let mut issued = self.lock();

        issued.latest += 1;
        let query = SearchQuery {
            text: text.clone(),
            sequence: issued.latest,
            issued_at: time::now(),
        };
        if let Some(previous) = issued.in_flight.take() {
            previous.cancel();
        }

        if text.chars().count() < self.min_query_len {
            debug!(sequence = query.sequence, len = text.chars().count(), "Query below minimum length, clearing results");
            self.state.send_modify(|state| {
                state.query = text;
                state.sequence = query.sequence;
                state.results.clear();
                state.is_loading = false;
                state.error = None;
            });
            return query;
        }

        let token = self.shutdown.child_token();
        issued.in_flight = Some(token.clone());
        self.state.send_modify(|state| {
            state.query = text.clone();
            state.is_loading = true;
        });
        drop(issued);

        let coordinator = Arc::clone(self);
        let sequence = query.sequence;
        tokio::spawn(async move { coordinator.run_query(sequence, text, token).await });
        query
    }

    async fn run_query(self: Arc<Self>, sequence: u64, text: String, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(sequence, "Search superseded during debounce");
                return;
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        debug!(sequence, %text, "Issuing search");
        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(sequence, "Search cancelled in flight");
                return;
            }
            result = self.backend.search(&text) => result,
        };

        self.apply_response(sequence, result);
    }

    /// Apply a backend response for `sequence`
    ///
    /// Returns false (and changes nothing) if a newer query was issued since.
    pub fn apply_response(
        &self,
        sequence: u64,
        result: Result<Vec<TrackRef>, SearchError>,
    ) -> bool {
        let mut issued = self.lock();
        if sequence != issued.latest {
            debug!(sequence, latest = issued.latest, "Discarding stale search response");
            return false;
        }
        issued.in_flight = None;

        match result {
            Ok(results) => {
                debug!(sequence, count = results.len(), "Applying search results");
                self.state.send_modify(|state| {
                    state.sequence = sequence;
                    state.results = results;
                    state.is_loading = false;
                    state.error = None;
                });
            }
            Err(err) => {
                warn!(sequence, error = %err, "Search failed");
                self.state.send_modify(|state| {
                    state.sequence = sequence;
                    state.results.clear();
                    state.is_loading = false;
                    state.error = Some(err.to_string());
                });
            }
        }
        true
    }

    /// Leave search: cancel pending work and reset to the empty, closed state
    pub fn clear(&self) {
        let mut issued = self.lock();
        issued.latest += 1;
        if let Some(previous) = issued.in_flight.take() {
            previous.cancel();
        }
        let sequence = issued.latest;
        self.state.send_replace(SearchState {
            sequence,
            ..SearchState::default()
        });
        debug!(sequence, "Search cleared");
    }

    /// Open or close the search bar; closing it clears the search
    pub fn set_active(&self, active: bool) {
        if active {
            self.state.send_if_modified(|state| {
                let changed = !state.is_active;
                state.is_active = true;
                changed
            });
        } else {
            self.clear();
        }
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn latest_sequence(&self) -> u64 {
        self.lock().latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory::{demo_catalog, CatalogSearch};

    fn setup() -> (Arc<CatalogSearch>, Arc<SearchCoordinator>) {
        let backend = Arc::new(CatalogSearch::new(demo_catalog()));
        let coordinator =
            SearchCoordinator::new(backend.clone(), &SearchConfig::default(), CancellationToken::new());
        (backend, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_strictly_increases() {
        let (_backend, coordinator) = setup();
        let a = coordinator.set_query("m");
        let b = coordinator.set_query("melody");
        coordinator.clear();
        let c = coordinator.set_query("mel");
        assert!(a.sequence < b.sequence);
        assert!(b.sequence + 1 < c.sequence);
        assert_eq!(coordinator.latest_sequence(), c.sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_clears_without_request() {
        let (backend, coordinator) = setup();
        coordinator.set_query("melody");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!coordinator.state().results.is_empty());

        coordinator.set_query("me");
        let state = coordinator.state();
        assert!(state.results.is_empty());
        assert!(!state.is_loading);
        assert_eq!(state.query, "me");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.calls(), vec!["melody".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let (_backend, coordinator) = setup();
        let old = coordinator.set_query("melo");
        let new = coordinator.set_query("trend");

        let fresh = vec![TrackRef::new("yt-0004", "Trending India")];
        assert!(coordinator.apply_response(new.sequence, Ok(fresh.clone())));
        assert!(!coordinator.apply_response(old.sequence, Ok(vec![TrackRef::new("x", "Stale")])));

        let state = coordinator.state();
        assert_eq!(state.results, fresh);
        assert_eq!(state.sequence, new.sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_then_success_clears_error() {
        let (backend, coordinator) = setup();
        backend.fail_query("melody");

        coordinator.set_query("melody");
        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = coordinator.state();
        assert!(state.error.is_some());
        assert!(!state.is_loading);

        coordinator.set_query("midnight");
        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = coordinator.state();
        assert!(state.error.is_none());
        assert_eq!(state.results.len(), 1);
        // No retry of the failed query
        assert_eq!(backend.calls(), vec!["melody".to_string(), "midnight".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_flag_survives_edits_until_closed() {
        let (_backend, coordinator) = setup();
        coordinator.set_active(true);
        coordinator.set_query("melody");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = coordinator.state();
        assert!(state.is_active);
        assert_eq!(state.results.len(), 1);

        coordinator.set_active(false);
        let state = coordinator.state();
        assert!(!state.is_active);
        assert!(state.query.is_empty());
        assert!(state.results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_search() {
        let (backend, coordinator) = setup();
        coordinator.set_query("melody");
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.clear();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(backend.calls().is_empty());
        let state = coordinator.state();
        assert_eq!(state.query, "");
        assert!(state.results.is_empty());
        assert!(!state.is_loading);
    }
}
