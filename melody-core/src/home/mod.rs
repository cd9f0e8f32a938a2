//! Home screen content

pub mod recommendations;

pub use recommendations::RecommendationsLoader;
