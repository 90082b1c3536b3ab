//!
//! Configuration validation for KeyRelay.
//!
//! Collects every problem before reporting so a single run shows the full list.
//! Errors fail validation; warnings are logged only.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::{Config, MEMORY_STORE_URL};
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration validator.
///
/// Validates network settings, the upstream endpoint, the key store URL and
/// the pool seed values.
pub struct ConfigValidator<'a> {
    /// Configuration to validate
    config: &'a Config,
    /// Validation errors collected during validation
    errors: Vec<String>,
    /// Validation warnings collected during validation
    warnings: Vec<String>,
}

/* --- implementations --------------------------------------------------------------------- */

impl<'a> ConfigValidator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, errors: Vec::new(), warnings: Vec::new() }
    }

    /// Run all checks.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid (warnings are logged)
    /// * `Err(ProxyError::Config)` - One or more errors, numbered in the message
    pub fn validate(self) -> Result<()> {
        let (errors, warnings) = self.collect();

        for warning in &warnings {
            tracing::warn!("Configuration warning: {}", warning);
        }

        if !errors.is_empty() {
            let error_msg = format!(
                "Configuration validation failed with {} error(s):\n\n{}\n\
                 \n\
                 Please fix these issues and try again.",
                errors.len(),
                errors
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {}", i + 1, e))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            return Err(ProxyError::Config(error_msg));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Run all checks and return `(errors, warnings)` without failing.
    pub fn collect(mut self) -> (Vec<String>, Vec<String>) {
        self.validate_server_config();
        self.validate_upstream_config();
        self.validate_store_config();
        self.validate_pool_config();
        (self.errors, self.warnings)
    }

    /* --- private validation methods ------------------------------------------------------ */

    fn validate_server_config(&mut self) {
        let server = &self.config.server;

        if server.port == 0 {
            self.add_error(format!(
                "Invalid server port {}: must be between 1 and 65535",
                server.port
            ));
        } else if server.port < 1024 {
            self.add_warning(format!(
                "Server port {} requires root/administrator privileges",
                server.port
            ));
        }

        if server.host.trim().is_empty() {
            self.add_error("server.host cannot be empty".to_string());
        }

        if !server.base_path.starts_with('/') {
            self.add_error(format!(
                "server.base_path '{}' must start with '/'",
                server.base_path
            ));
        }
    }

    fn validate_upstream_config(&mut self) {
        let upstream = &self.config.upstream;

        if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://")
        {
            self.add_error(format!(
                "upstream.base_url '{}' must be an http:// or https:// URL",
                upstream.base_url
            ));
        } else if upstream.base_url.starts_with("http://") {
            self.add_warning(format!(
                "upstream.base_url '{}' is not TLS protected; API keys will travel in clear text",
                upstream.base_url
            ));
        }

        if upstream.api_version.trim().is_empty() {
            self.add_error("upstream.api_version cannot be empty".to_string());
        }

        if upstream.default_model.trim().is_empty() {
            self.add_error("upstream.default_model cannot be empty".to_string());
        }

        if upstream.timeout_secs == 0 {
            self.add_error("upstream.timeout_secs must be greater than zero".to_string());
        }
    }

    fn validate_store_config(&mut self) {
        let url = &self.config.store.database_url;

        if url == MEMORY_STORE_URL {
            self.add_warning(
                "store.database_url is 'memory': keys and counters are lost on restart".to_string(),
            );
        } else if !url.starts_with("sqlite:") {
            self.add_error(format!(
                "store.database_url '{}' is not supported; use a sqlite: URL or 'memory'",
                url
            ));
        }
    }

    fn validate_pool_config(&mut self) {
        let pool = &self.config.pool;

        if pool.cooldown_hours < 0 {
            self.add_error(format!("pool.cooldown_hours cannot be negative ({})", pool.cooldown_hours));
        } else if pool.cooldown_hours == 0 {
            self.add_warning(
                "pool.cooldown_hours is 0: rate-limited keys become eligible immediately".to_string(),
            );
        }

        if pool.max_error_count < 1 {
            self.add_error(format!(
                "pool.max_error_count must be at least 1 (got {})",
                pool.max_error_count
            ));
        }

        if pool.error_reset_interval_hours < 0 {
            self.add_error(format!(
                "pool.error_reset_interval_hours cannot be negative ({})",
                pool.error_reset_interval_hours
            ));
        }

        if pool.maintenance_interval_secs == 0 {
            self.add_warning(
                "pool.maintenance_interval_secs is 0: error counters are never reset automatically"
                    .to_string(),
            );
        }
    }

    fn add_error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/* --- tests ------------------------------------------------------------------------------- */
