//! Test helper modules for melody-core integration tests
//!
//! - Harness: coordinator wired to the in-memory ports
//! - fixtures: tracks and liked-track records

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::{liked, track};
pub use harness::{settle, test_config, Harness};
