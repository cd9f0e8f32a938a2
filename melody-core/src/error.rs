//! Error types for melody-core
//!
//! One enum per failure source. None of them is fatal to the coordinator;
//! each degrades to a visible state field or a notification.

use melody_common::events::{ErrorInfo, ErrorKind};
use thiserror::Error;

/// Handshake or transport failure talking to the playback engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A playback call rejected by the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{command} rejected by session: {reason}")]
    Rejected { command: String, reason: String },

    #[error("session not connected")]
    NotConnected,
}

/// Remote library failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// No authenticated identity; the call was never attempted
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("library write failed: {0}")]
    Write(String),

    #[error("liked-tracks stream failed: {0}")]
    Stream(String),
}

/// Search backend failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search backend error: {0}")]
    Backend(String),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

/// Identity unavailable; surfaces as [`LibraryError::NotAuthenticated`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no authenticated identity available")]
    Unavailable,
}

impl From<AuthError> for LibraryError {
    fn from(_: AuthError) -> Self {
        LibraryError::NotAuthenticated
    }
}

impl From<melody_common::Error> for SearchError {
    fn from(err: melody_common::Error) -> Self {
        SearchError::InvalidResponse(err.to_string())
    }
}

/// Main error type for melody-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl Error {
    /// Category shown in `PlaybackState::last_error`
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Error::Connect(_) => ErrorKind::Connection,
            Error::Command(_) => ErrorKind::Command,
            Error::Library(_) => ErrorKind::Library,
            Error::Search(_) => ErrorKind::Search,
        }
    }

    /// Visible form of this error
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.error_kind(), self.to_string())
    }
}

/// Convenience Result type using melody-core Error
pub type Result<T> = std::result::Result<T, Error>;
