//! Integration tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing config files fall back to defaults instead of failing
//! - Priority order for config file resolution
//! - Malformed files surface as configuration errors
//!
//! Note: Uses serial_test to prevent environment variable races.
//! Tests that manipulate MELODY_CONFIG are marked with #[serial].

use melody_common::config::{resolve_config_path, CoordinatorConfig, CONFIG_ENV_VAR};
use melody_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).expect("create config file");
    file.write_all(content.as_bytes()).expect("write config file");
    path
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [connection]
        base_delay_ms = 250
        max_delay_ms = 4000
        auto_connect = false

        [library]
        settle_timeout_ms = 1500

        [logging]
        level = "debug"
        "#,
    );

    let config = CoordinatorConfig::load(&path).unwrap();
    assert_eq!(config.connection.base_delay_ms, 250);
    assert_eq!(config.connection.max_delay_ms, 4000);
    assert!(!config.connection.auto_connect);
    assert_eq!(config.library.settle_timeout_ms, 1500);
    assert_eq!(config.logging.level, "debug");
    // Untouched sections keep defaults
    assert_eq!(config.search.debounce_ms, 300);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = CoordinatorConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, CoordinatorConfig::default());

    let config = CoordinatorConfig::load_or_default(None).unwrap();
    assert_eq!(config, CoordinatorConfig::default());
}

#[test]
fn test_malformed_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[search]\ndebounce_ms = \"fast\"\n");

    let result = CoordinatorConfig::load_or_default(Some(&path));
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/melody-from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/melody-from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/melody-from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/melody-from-env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/melody-from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    // Only an existing user config file could be returned here
    if let Some(path) = resolved {
        assert!(path.exists());
    }

    env::remove_var(CONFIG_ENV_VAR);
}
