//!
//! Error handling for the KeyRelay gateway.
//!
//! Defines all error types used throughout the application using thiserror.
//! Pool, translation and upstream failures each get their own variant so the
//! server can map them onto distinct HTTP responses.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types.
///
/// Covers configuration, key pool, translation, upstream and storage failures.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("No API key is currently eligible for selection")]
    PoolExhausted,

    #[error("All eligible API keys have reached the error threshold")]
    AllKeysExhausted,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Upstream returned status {status}")]
    Upstream { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/* --- start of code -------------------------------------------------------------------------- */

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<sqlx::Error> for ProxyError {
    fn from(err: sqlx::Error) -> Self {
        ProxyError::Storage(err.to_string())
    }
}

impl ProxyError {
    /// True for the two "no usable key" conditions raised by the scheduler.
    pub fn is_pool_exhaustion(&self) -> bool {
        matches!(self, ProxyError::PoolExhausted | ProxyError::AllKeysExhausted)
    }

    /// Status code reported by the upstream, if this error came from one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProxyError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_classification() {
        assert!(ProxyError::PoolExhausted.is_pool_exhaustion());
        assert!(ProxyError::AllKeysExhausted.is_pool_exhaustion());
        assert!(!ProxyError::InvalidRequest("x".into()).is_pool_exhaustion());
    }

    #[test]
    fn test_upstream_status() {
        let err = ProxyError::Upstream { status: 429, body: "{}".into() };
        assert_eq!(err.upstream_status(), Some(429));
        assert_eq!(ProxyError::PoolExhausted.upstream_status(), None);
    }
}
