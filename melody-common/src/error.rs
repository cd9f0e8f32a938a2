//! Common error types for Melody

use thiserror::Error;

/// Common result type for Melody operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Melody crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML document could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON payload could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
