//! Configuration loading and config file resolution
//!
//! All settings have built-in defaults. The TOML file only overrides what it
//! names; a missing file is never fatal.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`MELODY_CONFIG`)
//! 3. `<user config dir>/melody/config.toml`
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MELODY_CONFIG";

/// Complete coordinator configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub home: HomeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Playback engine connection and retry settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// First retry delay
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the exponential backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Failed handshakes tolerated before staying `Failed`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Start connecting when a playback command arrives while disconnected
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

/// Search debounce settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Queries shorter than this clear results without a request
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
}

/// Liked-tracks reconciliation settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryConfig {
    /// How long an optimistic like may wait for a confirming emission
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,

    /// Delay before restarting an ended or failed liked-tracks stream
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
}

/// Playback position tracking
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Position poll interval while playing (0 disables polling)
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,
}

/// Home screen recommendations
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HomeConfig {
    /// Query sent to the search backend for the trending list
    #[serde(default = "default_trending_query")]
    pub trending_query: String,

    /// Load recommendations as soon as the coordinator starts
    #[serde(default = "default_true")]
    pub load_on_start: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_min_query_len() -> usize {
    3
}

fn default_settle_timeout_ms() -> u64 {
    5_000
}

fn default_resubscribe_delay_ms() -> u64 {
    2_000
}

fn default_position_poll_interval_ms() -> u64 {
    1_000
}

fn default_trending_query() -> String {
    "trending india".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            auto_connect: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_query_len: default_min_query_len(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            settle_timeout_ms: default_settle_timeout_ms(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            position_poll_interval_ms: default_position_poll_interval_ms(),
        }
    }
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            trending_query: default_trending_query(),
            load_on_start: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl LibraryConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

impl CoordinatorConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CoordinatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if given and present, otherwise fall back to defaults
    ///
    /// A missing file logs a warning; a malformed file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.connection.max_attempts == 0 {
            return Err(Error::Config(
                "connection.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.connection.base_delay_ms > self.connection.max_delay_ms {
            return Err(Error::Config(format!(
                "connection.base_delay_ms ({}) exceeds connection.max_delay_ms ({})",
                self.connection.base_delay_ms, self.connection.max_delay_ms
            )));
        }
        if self.search.min_query_len == 0 {
            return Err(Error::Config(
                "search.min_query_len must be at least 1".to_string(),
            ));
        }
        if self.home.trending_query.trim().is_empty() {
            return Err(Error::Config(
                "home.trending_query must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution following the priority order above.
///
/// Returns `None` when no source names an existing file.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    default_config_file().filter(|path| path.exists())
}

/// `<user config dir>/melody/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("melody").join("config.toml"))
}
