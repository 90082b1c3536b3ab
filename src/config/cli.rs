//!
//! CLI configuration commands for KeyRelay.
//!
//! Handles the `keyrelay config <subcommand>` family:
//! - `config show` - Display the effective configuration
//! - `config example` - Print an example configuration file
//! - `config path` - List the configuration files that are consulted
//! - `config validate` - Load and validate the configuration
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::io::{self, Write};

use crate::config::paths;
use crate::config::validation::ConfigValidator;
use crate::config::{Config, MEMORY_STORE_URL};
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// CLI configuration command handler.
pub struct ConfigCli;

/* --- implementations --------------------------------------------------------------------- */

impl ConfigCli {
    ///
    /// Dispatch a `config` subcommand.
    ///
    /// # Arguments
    ///  * `subcommand` - the word following `config`, `None` shows usage
    ///
    /// # Returns
    ///  * `Ok(())` - command finished
    ///  * `Err(ProxyError::Config)` - unknown subcommand or command failure
    pub fn run(subcommand: Option<&str>) -> Result<()> {
        match subcommand {
            Some("show") => Self::show(),
            Some("example") => {
                Self::example();
                Ok(())
            }
            Some("path") => Self::path(),
            Some("validate") => Self::validate(),
            Some(other) => Err(ProxyError::Config(format!(
                "Unknown config command: {}\n\nAvailable: show, example, path, validate",
                other
            ))),
            None => {
                Self::usage();
                Ok(())
            }
        }
    }

    /// Handle the `config show` command.
    ///
    /// Prints the configuration after merging all sources. The database URL
    /// is shown as configured, it holds no secret.
    pub fn show() -> Result<()> {
        println!("Current KeyRelay Configuration");
        println!("==============================");
        println!();

        let config = Config::load()?;

        println!("Server:");
        println!("  Listen: {}:{}", config.server.host, config.server.port);
        println!("  Base path: {}", config.server.base_path);
        println!("  Log level: {:?}", config.server.log_level);
        println!();

        println!("Upstream:");
        println!("  Base URL: {}", config.upstream.base_url);
        println!("  API version: {}", config.upstream.api_version);
        println!("  Default model: {}", config.upstream.default_model);
        println!("  Embeddings model: {}", config.upstream.embeddings_model);
        println!("  Timeout: {}s", config.upstream.timeout_secs);
        println!();

        println!("Store:");
        if config.uses_memory_store() {
            println!("  Database: {} (not persisted)", MEMORY_STORE_URL);
        } else {
            println!("  Database: {}", config.store.database_url);
        }
        println!();

        println!("Pool (initial values, stored settings take precedence):");
        println!("  Strategy: {}", config.pool.strategy);
        println!("  Cooldown: {}h", config.pool.cooldown_hours);
        println!("  Max error count: {}", config.pool.max_error_count);
        println!("  Error reset interval: {}h", config.pool.error_reset_interval_hours);
        println!("  Usage tracking: {}", config.pool.usage_tracking);
        println!("  Maintenance interval: {}s", config.pool.maintenance_interval_secs);
        println!();

        Self::path()
    }

    /// Handle the `config example` command.
    pub fn example() {
        print!("{}", Config::example_toml());
    }

    /// Handle the `config path` command.
    pub fn path() -> Result<()> {
        println!("Configuration files (highest priority first):");
        for (path, priority) in paths::config_file_paths().iter().zip(["user", "system"]) {
            let status = if path.exists() { "exists" } else { "not found" };
            println!("  {} ({}): {}", path.display(), priority, status);
        }
        println!();
        println!("Environment variables prefixed with KEYRELAY_ override every file.");
        Ok(())
    }

    ///
    /// Handle the `config validate` command.
    ///
    /// # Returns
    ///  * `Ok(())` - configuration is valid, warnings are printed
    ///  * `Err(ProxyError)` - loading or validation failed
    pub fn validate() -> Result<()> {
        println!("Validating KeyRelay Configuration");
        println!("=================================");
        println!();

        print!("Loading configuration... ");
        let _ = io::stdout().flush();

        let config = match crate::config::loader::ConfigLoader::new()
            .with_defaults()
            .with_system_config()
            .and_then(|l| l.with_user_config())
            .and_then(|l| l.with_env_vars())
            .and_then(|l| l.build_base())
        {
            Ok(config) => {
                println!("[OK]");
                config
            }
            Err(e) => {
                println!("[FAILED]");
                return Err(e);
            }
        };

        print!("Validating configuration... ");
        let _ = io::stdout().flush();

        let (errors, warnings) = ConfigValidator::new(&config).collect();
        if errors.is_empty() {
            println!("[OK]");
        } else {
            println!("[INVALID]");
        }

        for warning in &warnings {
            println!("  [WARNING] {}", warning);
        }
        for error in &errors {
            println!("  [ERROR] {}", error);
        }

        if !errors.is_empty() {
            return Err(ProxyError::Config(format!(
                "Configuration has {} error(s)",
                errors.len()
            )));
        }

        println!();
        println!("Configuration validation passed.");
        Ok(())
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn usage() {
        println!("USAGE:");
        println!("    keyrelay config <COMMAND>");
        println!();
        println!("COMMANDS:");
        println!("    show        Display the effective configuration");
        println!("    example     Print an example config.toml");
        println!("    path        List configuration file locations");
        println!("    validate    Validate the configuration");
    }
}

/* --- tests ------------------------------------------------------------------------------- */
