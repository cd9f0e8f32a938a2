//! # Melody Core Library (melody-core)
//!
//! Client-side playback coordinator.
//!
//! **Purpose:** keep one authoritative playback/session state consistent
//! across the playback engine, the remote liked-tracks store and the search
//! backend, and publish it to any number of observers.
//!
//! **Architecture:**
//! - `state`: State Broadcast Hub (serialized writes, ordered snapshots)
//! - `session`: connection manager, command dispatcher, position poller
//! - `library`: liked-tracks reconciliation
//! - `search`: debounced search with a staleness guard
//! - `home`: trending recommendations
//! - `ports`: traits for the external systems, plus in-memory versions
//! - `coordinator`: the facade wiring everything together

pub mod coordinator;
pub mod error;
pub mod home;
pub mod library;
pub mod notify;
pub mod ports;
pub mod search;
pub mod session;
pub mod state;

pub use coordinator::{Command, Coordinator};
pub use error::{Error, Result};
pub use ports::Ports;
pub use state::{StateHub, Subscription, SubscriptionHandle};
