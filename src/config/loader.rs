//!
//! Configuration loading system for KeyRelay.
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults
//! 2. System config file (/etc/keyrelay/config.toml)
//! 3. User config file (~/.config/keyrelay/config.toml)
//! 4. Environment variables (KEYRELAY_ prefix)
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::paths;
use crate::config::{Config, LogLevel};
use crate::error::{ProxyError, Result};
use crate::pool::SelectionStrategy;

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

/* --- constants ------------------------------------------------------------------------------ */

/** prefix of every recognised environment variable */
const ENV_PREFIX: &str = "KEYRELAY_";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration loader implementing the Builder pattern.
///
/// Each `with_*` step layers one source over the previous result. File
/// layers are merged at the TOML value level, so a file only overrides the
/// keys it actually sets.
pub struct ConfigLoader {
    /** merged TOML document built so far */
    document: toml::Table,
    /** environment overrides collected by `with_env_vars` */
    env_overrides: BTreeMap<String, String>,
    /** whether defaults have been applied */
    defaults_applied: bool,
}

/* --- implementations --------------------------------------------------------------------- */

impl ConfigLoader {
    /// Create an empty loader.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use keyrelay::config::loader::ConfigLoader;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ConfigLoader::new()
    ///     .with_defaults()
    ///     .with_user_config()?
    ///     .with_env_vars()?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self { document: toml::Table::new(), env_overrides: BTreeMap::new(), defaults_applied: false }
    }

    /// Apply built-in default values. Must be called first.
    pub fn with_defaults(mut self) -> Self {
        self.document = match toml::Value::try_from(Config::default()) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        };
        self.defaults_applied = true;
        self
    }

    /// Load the system-wide configuration file if present.
    pub fn with_system_config(mut self) -> Result<Self> {
        let system_config_path = paths::system_config_file()?;

        if system_config_path.exists() {
            tracing::debug!("Loading system config from: {}", system_config_path.display());
            self.load_config_file(&system_config_path)?;
        } else {
            tracing::debug!("System config not found at: {}", system_config_path.display());
        }

        Ok(self)
    }

    /// Load the user configuration file if present.
    pub fn with_user_config(mut self) -> Result<Self> {
        let user_config_path = paths::user_config_file()?;

        if user_config_path.exists() {
            tracing::debug!("Loading user config from: {}", user_config_path.display());
            self.load_config_file(&user_config_path)?;
        } else {
            tracing::debug!("User config not found at: {}", user_config_path.display());
        }

        Ok(self)
    }

    /// Load configuration from a specific file path. The file must exist.
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading custom config from: {}", path.display());
        self.load_config_file(path)?;
        Ok(self)
    }

    /// Collect `KEYRELAY_*` environment variables.
    ///
    /// They are applied in [`build`](Self::build) / [`build_base`](Self::build_base),
    /// after every file layer.
    pub fn with_env_vars(mut self) -> Result<Self> {
        tracing::debug!("Loading configuration from environment variables");

        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                self.env_overrides.insert(key, value);
            }
        }

        Ok(self)
    }

    /// Build and validate the final configuration.
    pub fn build(self) -> Result<Config> {
        let config = self.build_base()?;
        config.validate()?;

        tracing::info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Build the configuration without running validation.
    pub fn build_base(self) -> Result<Config> {
        if !self.defaults_applied {
            return Err(ProxyError::Config(
                "Configuration loader must call with_defaults() before build()".to_string(),
            ));
        }

        let mut config: Config = toml::Value::Table(self.document).try_into().map_err(|e| {
            ProxyError::Config(format!("Failed to assemble configuration: {}", e))
        })?;
        apply_env_overrides(&mut config, &self.env_overrides)?;

        tracing::debug!(
            "Config: server={}:{}, upstream={}, store={}, strategy={}",
            config.server.host,
            config.server.port,
            config.upstream.base_url,
            config.store.database_url,
            config.pool.strategy
        );

        Ok(config)
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Load and merge configuration from a TOML file
    fn load_config_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        paths::validate_config_file(path)?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let file_table: toml::Table = toml::from_str(&contents).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to parse TOML configuration file '{}': {}\n\
                 \n\
                 Please check the syntax of your configuration file.\n\
                 Run 'keyrelay config example' to see every supported key.",
                path.display(),
                e
            ))
        })?;

        merge_tables(&mut self.document, file_table);

        tracing::debug!("Successfully loaded config from: {}", path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/* --- utility functions ------------------------------------------------------------------- */

/// Recursively overlay `overlay` onto `base`; tables merge, scalars replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to the assembled configuration
fn apply_env_overrides(config: &mut Config, overrides: &BTreeMap<String, String>) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "KEYRELAY_SERVER_HOST" => config.server.host = value.clone(),
            "KEYRELAY_SERVER_PORT" => config.server.port = parse_env(value, key)?,
            "KEYRELAY_SERVER_LOG_LEVEL" => config.server.log_level = LogLevel::from_str(value)?,
            "KEYRELAY_SERVER_BASE_PATH" => config.server.base_path = value.clone(),

            "KEYRELAY_UPSTREAM_BASE_URL" => config.upstream.base_url = value.clone(),
            "KEYRELAY_UPSTREAM_API_VERSION" => config.upstream.api_version = value.clone(),
            "KEYRELAY_UPSTREAM_DEFAULT_MODEL" => config.upstream.default_model = value.clone(),
            "KEYRELAY_UPSTREAM_EMBEDDINGS_MODEL" => {
                config.upstream.embeddings_model = value.clone()
            }
            "KEYRELAY_UPSTREAM_TIMEOUT_SECS" => config.upstream.timeout_secs = parse_env(value, key)?,

            "KEYRELAY_STORE_DATABASE_URL" => config.store.database_url = value.clone(),

            "KEYRELAY_POOL_COOLDOWN_HOURS" => config.pool.cooldown_hours = parse_env(value, key)?,
            "KEYRELAY_POOL_MAX_ERROR_COUNT" => config.pool.max_error_count = parse_env(value, key)?,
            "KEYRELAY_POOL_ERROR_RESET_INTERVAL_HOURS" => {
                config.pool.error_reset_interval_hours = parse_env(value, key)?
            }
            "KEYRELAY_POOL_USAGE_TRACKING" => config.pool.usage_tracking = parse_bool_env(value, key)?,
            "KEYRELAY_POOL_STRATEGY" => {
                config.pool.strategy = SelectionStrategy::from_str(value).map_err(|e| {
                    ProxyError::Config(format!("Invalid {} value: {}", key, e))
                })?
            }
            "KEYRELAY_POOL_MAINTENANCE_INTERVAL_SECS" => {
                config.pool.maintenance_interval_secs = parse_env(value, key)?
            }

            _ => {
                tracing::debug!("Ignoring unknown environment variable: {}", key);
            }
        }
    }

    Ok(())
}

/// Parse a numeric environment variable
fn parse_env<T>(value: &str, var_name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ProxyError::Config(format!("Invalid {} value '{}': {}", var_name, value, e))
    })
}

/// Parse boolean value from environment variable
fn parse_bool_env(value: &str, var_name: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" | "enabled" => Ok(true),
        "false" | "no" | "0" | "off" | "disabled" => Ok(false),
        _ => Err(ProxyError::Config(format!(
            "Invalid boolean value for {}: '{}'\n\
             Valid values: true/false, yes/no, 1/0, on/off, enabled/disabled",
            var_name, value
        ))),
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_loader_defaults() {
        let config =
            ConfigLoader::new().with_defaults().build_base().expect("Should build with defaults");

        assert_eq!(config.server.port, 3000);
        assert!(matches!(config.server.log_level, LogLevel::Info));
        assert_eq!(config.pool.cooldown_hours, 24);
        assert_eq!(config.pool.strategy, SelectionStrategy::RoundRobin);
    }

    #[test]
    fn test_loader_requires_defaults() {
        let result = ConfigLoader::new().build_base();
        assert!(result.is_err());
    }

    #[test]
    fn test_file_only_overrides_keys_it_sets() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(
            &config_file,
            r#"
[server]
port = 8080

[pool]
strategy = "least_used"
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&config_file)
            .expect("Should read file")
            .build_base()
            .expect("Should build");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.base_path, "/v1");
        assert_eq!(config.pool.strategy, SelectionStrategy::LeastUsed);
        assert_eq!(config.pool.max_error_count, 5);
    }

    #[test]
    fn test_later_file_wins() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.toml");
        let second = temp_dir.path().join("second.toml");
        fs::write(&first, "[server]\nport = 7000\nhost = \"127.0.0.1\"\n").unwrap();
        fs::write(&second, "[server]\nport = 7001\n").unwrap();

        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&first)
            .unwrap()
            .with_config_file(&second)
            .unwrap()
            .build_base()
            .unwrap();

        assert_eq!(config.server.port, 7001);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_toml_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[server\nport = 8080\n").unwrap();

        let result = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&config_file)
            .and_then(|loader| loader.build_base());

        assert!(result.is_err());
        let error_msg = format!("{}", result.unwrap_err());
        assert!(error_msg.contains("Failed to parse TOML"));
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: toml::Table = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Table = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        merge_tables(&mut base, overlay);

        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }

    #[test]
    fn test_boolean_env_parsing() {
        assert!(parse_bool_env("true", "TEST").unwrap());
        assert!(parse_bool_env("Enabled", "TEST").unwrap());
        assert!(!parse_bool_env("0", "TEST").unwrap());
        assert!(!parse_bool_env("off", "TEST").unwrap());
        assert!(parse_bool_env("maybe", "TEST").is_err());
    }

    #[test]
    fn test_numeric_env_parsing() {
        let port: u16 = parse_env(" 8080 ", "KEYRELAY_SERVER_PORT").unwrap();
        assert_eq!(port, 8080);
        assert!(parse_env::<u16>("70000", "KEYRELAY_SERVER_PORT").is_err());
    }
}
