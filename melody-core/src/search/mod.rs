//! Debounced, cancellable catalog search

pub mod coordinator;

pub use coordinator::SearchCoordinator;
