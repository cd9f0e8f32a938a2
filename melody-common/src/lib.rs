//! # Melody Common Library
//!
//! Shared code for the Melody playback coordinator including:
//! - Track, library and identity value types
//! - Snapshot types published to observers (playback, connection, search, library)
//! - Search DTO mapping
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod dto;
pub mod error;
pub mod events;
pub mod identity;
pub mod library;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use identity::{AuthMode, UserIdentity};
pub use library::LikedTrack;
pub use track::{TrackKind, TrackRef};
