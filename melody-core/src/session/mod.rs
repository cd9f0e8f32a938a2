//! Playback session modules
//!
//! - `command`: playback commands and their optimistic effect
//! - `queue`: ordered queue of commands issued while not connected
//! - `dispatcher`: executes commands against the session port in order
//! - `connection`: connection lifecycle state machine with retry
//! - `position`: position polling while playing

pub mod command;
pub mod connection;
pub mod dispatcher;
pub mod position;
pub mod queue;

pub use command::PlaybackCommand;
pub use connection::{next_status, ConnectionEvent, ConnectionManager, EngineWatcher, RetryPolicy};
pub use dispatcher::{CommandDispatcher, CommandExecutor, DispatchOutcome};
pub use position::PositionPoller;
