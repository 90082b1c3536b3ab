//! Configuration validation tests
//!
//! Checks the error and warning lists produced by `ConfigValidator` for each
//! configuration section.

use keyrelay::config::validation::ConfigValidator;
use keyrelay::config::{Config, MEMORY_STORE_URL};

fn collect(config: &Config) -> (Vec<String>, Vec<String>) {
    ConfigValidator::new(config).collect()
}

/// Test that the default configuration passes without errors
#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    let (errors, warnings) = collect(&config);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    assert!(config.validate().is_ok());
}

/// Test server section checks
#[test]
fn test_server_validation() {
    let mut config = Config::default();
    config.server.port = 0;
    config.server.base_path = "v1".to_string();
    let (errors, _) = collect(&config);
    assert_eq!(errors.len(), 2, "{:?}", errors);

    let mut config = Config::default();
    config.server.port = 80;
    let (errors, warnings) = collect(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.contains("privileges")));
}

/// Test upstream section checks
#[test]
fn test_upstream_validation() {
    let mut config = Config::default();
    config.upstream.base_url = "generativelanguage.googleapis.com".to_string();
    config.upstream.timeout_secs = 0;
    let (errors, _) = collect(&config);
    assert!(errors.iter().any(|e| e.contains("base_url")));
    assert!(errors.iter().any(|e| e.contains("timeout_secs")));

    let mut config = Config::default();
    config.upstream.base_url = "http://127.0.0.1:9000".to_string();
    let (errors, warnings) = collect(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.contains("clear text")));
}

/// Test store section checks
#[test]
fn test_store_validation() {
    let mut config = Config::default();
    config.store.database_url = MEMORY_STORE_URL.to_string();
    let (errors, warnings) = collect(&config);
    assert!(errors.is_empty());
    assert_eq!(warnings.len(), 1);

    config.store.database_url = "mysql://localhost/keys".to_string();
    let (errors, _) = collect(&config);
    assert_eq!(errors.len(), 1);
}

/// Test pool section checks
#[test]
fn test_pool_validation() {
    let mut config = Config::default();
    config.pool.cooldown_hours = -1;
    config.pool.max_error_count = 0;
    config.pool.error_reset_interval_hours = -2;
    let (errors, _) = collect(&config);
    assert_eq!(errors.len(), 3, "{:?}", errors);

    let mut config = Config::default();
    config.pool.cooldown_hours = 0;
    config.pool.maintenance_interval_secs = 0;
    let (errors, warnings) = collect(&config);
    assert!(errors.is_empty());
    assert_eq!(warnings.len(), 2);
}

/// Test that validate() numbers every error in its message
#[test]
fn test_error_message_lists_all_errors() {
    let mut config = Config::default();
    config.server.host = " ".to_string();
    config.upstream.default_model = String::new();

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("2 error(s)"));
    assert!(message.contains("1. "));
    assert!(message.contains("2. "));
}
