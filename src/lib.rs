//! # KeyRelay - OpenAI-compatible gateway over a pool of Gemini API keys
//!
//! This crate serves the OpenAI chat completions, embeddings and models API on
//! top of Google's Gemini API. Upstream keys come from a persisted pool with
//! cooldown-aware scheduling; streamed answers are re-framed on the fly into
//! the OpenAI chunk protocol.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use keyrelay::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Create the application
//!     let app = create_app(config).await?;
//!
//!     // Start server
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Layered TOML and environment configuration
//! - [`store`] - Persistent key pool ([`store::CredentialStore`]), sqlite and in-memory
//! - [`pool`] - Key scheduler with round-robin, least-used and random strategies
//! - [`converter`] - OpenAI and Gemini wire types and the translation between them
//! - [`stream`] - SSE framing and chunk re-emission for streamed answers
//! - [`upstream`] - Gemini HTTP client
//! - [`auth`] - Caller key or pool key resolution
//! - [`gateway`] - Per-request orchestration and outcome recording
//! - [`server`] - HTTP route handlers
//! - [`error`] - Error types and handling

pub mod auth;
pub mod config;
pub mod converter;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod server;
pub mod store;
pub mod stream;
pub mod upstream;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

// Re-export commonly used types
pub use config::Config;
pub use error::ProxyError;
pub use server::AppState;

/// Creates a new KeyRelay application with the given configuration.
///
/// Opens the key store named by `store.database_url` and builds the router.
///
/// # Arguments
///
/// * `config` - Application configuration
///
/// # Returns
///
/// Returns an Axum Router that can be served directly.
///
/// # Errors
///
/// Returns a `ProxyError` if the store cannot be opened or the upstream
/// client cannot be built.
pub async fn create_app(config: Config) -> Result<Router, ProxyError> {
    let store = store::open(&config).await?;
    let state = Arc::new(AppState::new(config, store)?);
    Ok(router(state))
}

/// Builds the router for an already wired application state.
///
/// The OpenAI-compatible routes are mounted under `server.base_path`,
/// `/health` always sits at the root.
pub fn router(state: Arc<AppState>) -> Router {
    let base = state.config.server.base_path.trim_end_matches('/').to_string();

    Router::new()
        .route(&format!("{}/chat/completions", base), post(server::chat_completions))
        .route(&format!("{}/embeddings", base), post(server::embeddings))
        .route(&format!("{}/models", base), get(server::models))
        .route("/health", get(server::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
