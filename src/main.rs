//! # KeyRelay - OpenAI-compatible gateway over a pool of Gemini API keys
//!
//! Serves `/v1/chat/completions`, `/v1/embeddings` and `/v1/models` in the
//! OpenAI format and forwards them to Gemini, picking an upstream key from a
//! persisted pool. Rate-limited keys are cooled down, failing keys are
//! skipped until their error counters are reset.
//!
//! ## Quick Start
//!
//! ```bash
//! # optional: write a config file
//! keyrelay config example > ~/.config/keyrelay/config.toml
//!
//! # or override single values
//! export KEYRELAY_SERVER_PORT=3000
//! export KEYRELAY_STORE_DATABASE_URL="sqlite:///var/lib/keyrelay/keyrelay.db"
//!
//! keyrelay
//! ```
//!
//! ## API Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/v1/chat/completions \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "model": "gemini-2.5-flash",
//!     "messages": [{"role": "user", "content": "Hello!"}],
//!     "stream": false
//!   }'
//! ```
//!
//! Callers sending `Authorization: Bearer <gemini key>` use their own key and
//! bypass the pool.
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp
//!

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyrelay::config::cli::ConfigCli;
use keyrelay::config::validation::ConfigValidator;
use keyrelay::error::{ProxyError, Result};
use keyrelay::{AppState, Config, pool, store};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the KeyRelay gateway.
///
/// Handles CLI commands, loads configuration, opens the key store, starts
/// the pool maintenance task and serves HTTP until shutdown.
#[tokio::main]
async fn main() {
    // .env values are visible to the KEYRELAY_* overrides
    let _ = dotenvy::dotenv();

    handle_cli_args().await;

    if let Err(e) = run().await {
        let error_msg = format!("{}", e);
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    initialize_logging(&config);

    let key_store = store::open(&config).await?;
    let app_state = Arc::new(AppState::new(config.clone(), key_store)?);

    if config.pool.maintenance_interval_secs > 0 {
        pool::spawn_maintenance(
            app_state.gateway.scheduler().clone(),
            Duration::from_secs(config.pool.maintenance_interval_secs),
        );
    } else {
        warn!("Pool maintenance disabled; error counters are only reset by operators");
    }

    let app = keyrelay::router(app_state);
    start_server(&config, app).await
}

///
/// Handle command line arguments before the server starts.
///
/// These commands work even when the configuration is broken.
async fn handle_cli_args() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return;
    }

    match args[1].as_str() {
        "--version" | "-V" => {
            println!("keyrelay {}", VERSION);
            std::process::exit(0);
        }
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        "doctor" => {
            let exit_code = run_doctor().await;
            std::process::exit(exit_code);
        }
        "validate" => {
            let exit_code = run_validate();
            std::process::exit(exit_code);
        }
        "config" => {
            let exit_code = match ConfigCli::run(args.get(2).map(String::as_str)) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("{}", e);
                    1
                }
            };
            std::process::exit(exit_code);
        }
        _ => {
            if args[1].starts_with('-') {
                eprintln!("Error: Unknown option: {}", args[1]);
                eprintln!();
                print_help();
                std::process::exit(1);
            } else {
                eprintln!("Error: Unknown command: {}", args[1]);
                eprintln!();
                eprintln!("Available commands:");
                eprintln!("  doctor    - Run configuration and key store health check");
                eprintln!("  validate  - Validate configuration");
                eprintln!("  config    - Show, locate or print example configuration");
                eprintln!();
                eprintln!("Available options:");
                eprintln!("  --version, -V  - Show version");
                eprintln!("  --help, -h     - Show help");
                eprintln!();
                eprintln!("Run 'keyrelay --help' for more information.");
                std::process::exit(1);
            }
        }
    }
}

///
/// Print help information for the KeyRelay CLI.
fn print_help() {
    println!("KeyRelay v{}", VERSION);
    println!("OpenAI-compatible gateway serving Gemini through a pool of API keys");
    println!();
    println!("USAGE:");
    println!("    keyrelay [COMMAND] [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    doctor              Check configuration, key store and pool health");
    println!("    validate            Validate configuration and exit");
    println!("    config show         Display the effective configuration");
    println!("    config example      Print an example config.toml");
    println!("    config path         List configuration file locations");
    println!("    config validate     Validate configuration with details");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print help information");
    println!("    -V, --version       Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    KEYRELAY_SERVER_HOST               Bind address (default: 0.0.0.0)");
    println!("    KEYRELAY_SERVER_PORT               Server port (default: 3000)");
    println!(
        "    KEYRELAY_SERVER_LOG_LEVEL          trace, debug, info, warn, error (default: info)"
    );
    println!("    KEYRELAY_UPSTREAM_BASE_URL         Gemini API base URL");
    println!("    KEYRELAY_UPSTREAM_DEFAULT_MODEL    Model used when a request names none");
    println!("    KEYRELAY_STORE_DATABASE_URL        sqlite URL of the key store, or 'memory'");
    println!("    KEYRELAY_POOL_STRATEGY             round_robin, least_used, random");
    println!("    RUST_LOG                           Overrides the log filter");
    println!();
    println!("EXAMPLES:");
    println!("    keyrelay                    Start the gateway");
    println!("    keyrelay doctor             Check configuration and key pool");
    println!("    keyrelay config example     Print a starter configuration");
}

///
/// Run the doctor command.
///
/// Loads and validates the configuration, opens the key store and reports
/// the pool headcount and effective pool settings.
///
/// # Returns
///  * process exit code, 0 when everything needed to serve is in place
async fn run_doctor() -> i32 {
    println!("KeyRelay Doctor - Configuration Health Check");
    println!("{}", "=".repeat(60));
    println!();

    if std::path::Path::new(".env").exists() {
        println!("[OK] Found .env file");
    } else {
        println!("[INFO] No .env file found (using environment variables)");
    }
    println!();

    println!("Configuration Validation:");
    let config = match keyrelay::config::loader::ConfigLoader::new()
        .with_defaults()
        .with_system_config()
        .and_then(|l| l.with_user_config())
        .and_then(|l| l.with_env_vars())
        .and_then(|l| l.build_base())
    {
        Ok(config) => {
            println!("  [OK] Configuration loaded successfully");
            config
        }
        Err(e) => {
            println!("  [ERROR] Failed to load configuration:");
            println!("     {}", e);
            println!();
            println!("Run 'keyrelay config path' to see which files are read.");
            return 1;
        }
    };

    let (errors, warnings) = ConfigValidator::new(&config).collect();
    for warning in &warnings {
        println!("  [WARNING] {}", warning);
    }
    for error in &errors {
        println!("  [ERROR] {}", error);
    }
    if !errors.is_empty() {
        println!();
        println!("[ERROR] Configuration has errors. Please fix them before running KeyRelay.");
        return 1;
    }
    if warnings.is_empty() {
        println!("  [OK] No validation issues found");
    }
    println!();

    println!("Key Store:");
    let key_store = match store::open(&config).await {
        Ok(key_store) => {
            println!("  [OK] Opened {}", config.store.database_url);
            key_store
        }
        Err(e) => {
            println!("  [ERROR] Cannot open key store: {}", e);
            return 1;
        }
    };

    match key_store.pool_summary().await {
        Ok(summary) => {
            println!(
                "  [OK] {} key(s): {} active, {} inactive",
                summary.total, summary.active, summary.inactive
            );
            if summary.active == 0 {
                println!("  [WARNING] No active keys; only callers bringing their own key will be served");
            }
        }
        Err(e) => {
            println!("  [ERROR] Cannot read key pool: {}", e);
            return 1;
        }
    }

    let scheduler = pool::PoolScheduler::new(key_store, config.pool.clone());
    match scheduler.settings().await {
        Ok(settings) => {
            println!(
                "  [OK] strategy={}, cooldown={}h, max_errors={}, error_reset={}h, usage_tracking={}",
                settings.strategy,
                settings.cooldown_hours,
                settings.max_error_count,
                settings.error_reset_interval_hours,
                settings.usage_tracking
            );
        }
        Err(e) => {
            println!("  [ERROR] Cannot read pool settings: {}", e);
            return 1;
        }
    }

    println!();
    println!("[SUCCESS] KeyRelay is ready to run.");
    0
}

///
/// Run the validate command to validate configuration and exit.
///
/// Returns exit code 0 if valid, 1 if invalid.
fn run_validate() -> i32 {
    match Config::load() {
        Ok(_) => {
            println!("[OK] Configuration is valid");
            0
        }
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            1
        }
    }
}

///
/// Initialize logging.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Arguments
///  * `config` - application configuration containing log level settings
fn initialize_logging(config: &Config) {
    let level = config.server.log_level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

///
/// Start the HTTP server and log startup information.
///
/// # Arguments
///  * `config` - application configuration
///  * `app` - configured Axum application
///
/// # Returns
///  * `Ok(())` when server shuts down gracefully
///  * `ProxyError::Http` if server binding or startup fails
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let port = config.server.port;
    let address = format!("{}:{}", config.server.host, port);

    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        let error_msg = format!("Failed to bind to {}: {}", address, e);

        if e.kind() == std::io::ErrorKind::AddrInUse {
            ProxyError::Http(format!(
                "{}\n\n\
                Port {} is already in use. Here are some solutions:\n\n\
                1. Close the other instance:\n\
                   • Find the process using port {}:\n\
                     lsof -i :{}\n\
                   • Kill the process:\n\
                     kill <PID>\n\n\
                2. Change the port:\n\
                   export KEYRELAY_SERVER_PORT={}\n\
                   keyrelay\n\n\
                Run 'keyrelay doctor' for more help.",
                error_msg,
                port,
                port,
                port,
                port.saturating_add(1)
            ))
        } else {
            ProxyError::Http(format!(
                "{}\n\n\
                To fix this:\n\
                • Check that server.host is a local address\n\
                • Ensure you have permission to bind to the port\n\
                • Try a different port: export KEYRELAY_SERVER_PORT=3001\n\n\
                Run 'keyrelay doctor' for more help.",
                error_msg
            ))
        }
    })?;

    log_startup_info(config);

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Http(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
///
/// # Arguments
///  * `config` - application configuration
fn log_startup_info(config: &Config) {
    info!("KeyRelay v{} listening on {}:{}", VERSION, config.server.host, config.server.port);
    info!(
        "OpenAI-compatible endpoint: http://localhost:{}{}",
        config.server.port, config.server.base_path
    );
    info!("Upstream: {} ({})", config.upstream.base_url, config.upstream.api_version);
    if config.uses_memory_store() {
        info!("Key store: in-memory");
    } else {
        info!("Key store: {}", config.store.database_url);
    }

    if config.server.log_level.is_trace_enabled() {
        info!(
            "[TRACE] Trace logging is ENABLED (KEYRELAY_SERVER_LOG_LEVEL={:?}) - translated \
             request and response bodies will be logged",
            config.server.log_level
        );
    }
}
