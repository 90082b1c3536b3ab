//! Configuration module tests
//!
//! Tests layered loading: defaults, TOML files and `KEYRELAY_*` overrides.
//!
//! Uses temp-env to safely manage environment variables during tests, automatically
//! restoring them after each test completes, and tempfile for config files.

use std::fs;

use keyrelay::config::loader::ConfigLoader;
use keyrelay::config::{Config, LogLevel};
use keyrelay::pool::SelectionStrategy;
use temp_env::with_vars;
use tempfile::TempDir;

fn load_with_file(contents: &str) -> keyrelay::error::Result<Config> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();

    ConfigLoader::new().with_defaults().with_config_file(&path)?.with_env_vars()?.build()
}

/// Test that built-in defaults describe a runnable gateway
#[test]
fn test_defaults() {
    with_vars(vec![("KEYRELAY_SERVER_PORT", None::<&str>)], || {
        let config = load_with_file("").expect("defaults must be valid");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.base_path, "/v1");
        assert!(matches!(config.server.log_level, LogLevel::Info));
        assert_eq!(config.upstream.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(config.pool.cooldown_hours, 24);
        assert_eq!(config.pool.max_error_count, 5);
        assert_eq!(config.pool.error_reset_interval_hours, 1);
        assert!(config.pool.usage_tracking);
        assert_eq!(config.pool.strategy, SelectionStrategy::RoundRobin);
    });
}

/// Test that environment variables win over file values
#[test]
fn test_env_overrides_file() {
    with_vars(
        vec![
            ("KEYRELAY_SERVER_PORT", Some("9100")),
            ("KEYRELAY_POOL_STRATEGY", Some("least_used")),
            ("KEYRELAY_POOL_USAGE_TRACKING", Some("off")),
            ("KEYRELAY_STORE_DATABASE_URL", Some("memory")),
        ],
        || {
            let config = load_with_file(
                "[server]\nport = 8000\nhost = \"127.0.0.1\"\n\n[pool]\nstrategy = \"random\"\n",
            )
            .unwrap();
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.pool.strategy, SelectionStrategy::LeastUsed);
            assert!(!config.pool.usage_tracking);
            assert!(config.uses_memory_store());
        },
    );
}

/// Test that malformed environment values are reported by name
#[test]
fn test_invalid_env_values() {
    with_vars(vec![("KEYRELAY_POOL_COOLDOWN_HOURS", Some("a day"))], || {
        let err = load_with_file("").unwrap_err();
        assert!(err.to_string().contains("KEYRELAY_POOL_COOLDOWN_HOURS"));
    });

    with_vars(vec![("KEYRELAY_POOL_STRATEGY", Some("fastest"))], || {
        let err = load_with_file("").unwrap_err();
        assert!(err.to_string().contains("KEYRELAY_POOL_STRATEGY"));
    });

    with_vars(vec![("KEYRELAY_SERVER_LOG_LEVEL", Some("chatty"))], || {
        assert!(load_with_file("").is_err());
    });
}

/// Test that unknown KEYRELAY_ variables are ignored
#[test]
fn test_unknown_env_vars_ignored() {
    with_vars(vec![("KEYRELAY_NOT_A_SETTING", Some("x"))], || {
        assert!(load_with_file("").is_ok());
    });
}

/// Test that validation runs on build
#[test]
fn test_build_rejects_invalid_values() {
    with_vars(vec![("KEYRELAY_POOL_MAX_ERROR_COUNT", None::<&str>)], || {
        let err = load_with_file("[pool]\nmax_error_count = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_error_count"));

        let err = load_with_file("[store]\ndatabase_url = \"postgres://db/keys\"\n").unwrap_err();
        assert!(err.to_string().contains("database_url"));
    });
}

/// Test that a missing config file is an error when named explicitly
#[test]
fn test_missing_explicit_file() {
    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::new().with_defaults().with_config_file(dir.path().join("nope.toml"));
    assert!(result.is_err());
}

/// Test that the shipped example parses and validates
#[test]
fn test_example_config_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, Config::example_toml()).unwrap();

    let config = ConfigLoader::new().with_defaults().with_config_file(&path).unwrap().build().unwrap();
    assert_eq!(config.upstream.default_model, "gemini-2.5-flash");
    assert_eq!(config.pool.maintenance_interval_secs, 600);
}
