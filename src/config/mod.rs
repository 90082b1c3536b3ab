//!
//! Configuration management for KeyRelay.
//!
//! This module provides the layered configuration system:
//! - Platform-native configuration directories (XDG on Linux, standard paths on macOS/Windows)
//! - TOML format for human-readable configuration files
//! - Multi-layered configuration hierarchy (env vars > user config > system config > defaults)
//!
//! Split by concern:
//! - `loader.rs` - Configuration loading logic
//! - `paths.rs` - Platform-native path resolution
//! - `validation.rs` - Configuration validation
//! - `cli.rs` - CLI configuration commands
//!
//! The `[pool]` section only seeds the persisted pool settings. Values stored in
//! the key store always win, so several gateway replicas sharing one store agree.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cli;
pub mod loader;
pub mod paths;
pub mod validation;

/* --- uses ------------------------------------------------------------------------------------ */

use crate::error::{ProxyError, Result};
use crate::pool::SelectionStrategy;
use serde::{Deserialize, Serialize};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Main application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Gemini upstream configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Key store location
    #[serde(default)]
    pub store: StoreConfig,
    /// Seed values for the persisted pool settings
    #[serde(default)]
    pub pool: PoolConfig,
}

///
/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP server port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application logging level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Path prefix for the OpenAI-compatible routes
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

///
/// Gemini upstream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Generative Language API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API version path segment
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Chat model used when the request names none (or an unknown family)
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Embedding model used when the request names none
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: String,
    /// Whole-request timeout for upstream calls (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

///
/// Key store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `sqlite:` URL, or `memory` for a process-local store
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

///
/// Seed values for the pool settings persisted in the key store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Hours a rate-limited key stays hidden from selection
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
    /// Keys with this many recorded errors are skipped
    #[serde(default = "default_max_error_count")]
    pub max_error_count: i64,
    /// Error counters are cleared after this many quiet hours
    #[serde(default = "default_error_reset_interval_hours")]
    pub error_reset_interval_hours: i64,
    /// Whether successful and failed calls are appended to the usage log
    #[serde(default = "default_usage_tracking")]
    pub usage_tracking: bool,
    /// Selection strategy
    #[serde(default)]
    pub strategy: SelectionStrategy,
    /// Interval of the error-reset sweep (seconds, 0 disables it)
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

///
/// Logging level enumeration.
///
/// Defines available log levels compatible with tracing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

/* --- constants ------------------------------------------------------------------------------ */

/** literal database URL selecting the in-memory store */
pub const MEMORY_STORE_URL: &str = "memory";

/* --- defaults -------------------------------------------------------------------------------- */

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default HTTP port
fn default_port() -> u16 {
    3000
}

/// Default logging level
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_base_path() -> String {
    "/v1".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_version() -> String {
    "v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_embeddings_model() -> String {
    "text-embedding-004".to_string()
}

/// Default upstream timeout (5 minutes, long generations stream slowly)
fn default_timeout_secs() -> u64 {
    300
}

/// Default database: `keyrelay.db` in the user data directory
fn default_database_url() -> String {
    match paths::default_database_file() {
        Ok(path) => format!("sqlite://{}", path.display()),
        Err(_) => "sqlite://keyrelay.db".to_string(),
    }
}

fn default_cooldown_hours() -> i64 {
    24
}

fn default_max_error_count() -> i64 {
    5
}

fn default_error_reset_interval_hours() -> i64 {
    1
}

fn default_usage_tracking() -> bool {
    true
}

fn default_maintenance_interval_secs() -> u64 {
    600
}

/* --- implementations --------------------------------------------------------------------- */

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            base_path: default_base_path(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            default_model: default_model(),
            embeddings_model: default_embeddings_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_url: default_database_url() }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: default_cooldown_hours(),
            max_error_count: default_max_error_count(),
            error_reset_interval_hours: default_error_reset_interval_hours(),
            usage_tracking: default_usage_tracking(),
            strategy: SelectionStrategy::default(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the standard hierarchy:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (~/.config/keyrelay/config.toml)
    /// 3. System config file (/etc/keyrelay/config.toml)
    /// 4. Built-in defaults (lowest priority)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(ProxyError)` - Configuration loading or validation failed
    pub fn load() -> Result<Self> {
        loader::ConfigLoader::new()
            .with_defaults()
            .with_system_config()?
            .with_user_config()?
            .with_env_vars()?
            .build()
    }

    /// Validate the current configuration
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid
    /// * `Err(ProxyError)` - Configuration validation failed with details
    pub fn validate(&self) -> Result<()> {
        validation::ConfigValidator::new(self).validate()
    }

    /// True when the key store is process-local.
    pub fn uses_memory_store(&self) -> bool {
        self.store.database_url == MEMORY_STORE_URL
    }

    /// Get configuration file example as TOML string
    pub fn example_toml() -> &'static str {
        r#"# KeyRelay Configuration
# This file should be placed at:
#   Linux/Unix: ~/.config/keyrelay/config.toml
#   macOS: ~/Library/Application Support/keyrelay/config.toml
#   Windows: %APPDATA%/keyrelay/config.toml

[server]
host = "0.0.0.0"
port = 3000
# trace, debug, info, warn, error
log_level = "info"
# OpenAI-compatible routes are served under this prefix
base_path = "/v1"

[upstream]
base_url = "https://generativelanguage.googleapis.com"
api_version = "v1beta"
default_model = "gemini-2.5-flash"
embeddings_model = "text-embedding-004"
timeout_secs = 300

[store]
# sqlite database holding api_keys, usage_logs and pool_config
# use "memory" for a throwaway in-process store
database_url = "sqlite://~/.local/share/keyrelay/keyrelay.db"

[pool]
# Initial values only: once written to pool_config in the store, the
# stored values take precedence.
cooldown_hours = 24
max_error_count = 5
error_reset_interval_hours = 1
usage_tracking = true
# round_robin, least_used, random
strategy = "round_robin"
# error-reset sweep period in seconds (0 disables it)
maintenance_interval_secs = 600
"#
    }
}

impl LogLevel {
    /// Convert to tracing::Level for logging setup
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    /// Check if payload dumps should be logged
    pub fn is_trace_enabled(self) -> bool {
        matches!(self, LogLevel::Trace | LogLevel::Debug)
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ProxyError::Config(format!(
                "Invalid log level '{}'. Valid levels are: trace, debug, info, warn, error",
                s
            ))),
        }
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses() {
        let config: Config = toml::from_str(Config::example_toml()).expect("example must parse");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pool.cooldown_hours, 24);
        assert_eq!(config.pool.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.upstream.default_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[server]\nport = 8081\n").unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.base_path, "/v1");
        assert_eq!(config.pool.max_error_count, 5);
        assert_eq!(config.upstream.api_version, "v1beta");
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("WARNING").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("loud").is_err());
        assert!(LogLevel::Debug.is_trace_enabled());
        assert!(!LogLevel::Info.is_trace_enabled());
    }

    #[test]
    fn test_memory_store_detection() {
        let mut config = Config::default();
        assert!(!config.uses_memory_store());
        config.store.database_url = MEMORY_STORE_URL.to_string();
        assert!(config.uses_memory_store());
    }
}
