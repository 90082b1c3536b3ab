//!
//! Upstream credential resolution.
//!
//! A caller that sends its own `Authorization: Bearer <key>` header uses that
//! key directly and never touches the pool. Everyone else is served a key
//! chosen by the [`PoolScheduler`].
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::error::Result;
use crate::pool::PoolScheduler;
use crate::store::{Credential, mask_secret};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Key used for one upstream call.
#[derive(Debug, Clone)]
pub enum CredentialLease {
    /** key supplied by the caller; outcomes are not recorded */
    Caller(String),
    /** key selected from the pool */
    Pool(Credential),
}

/* --- constants ------------------------------------------------------------------------------ */

/** Bearer token prefix */
const BEARER_PREFIX: &str = "Bearer ";

/* --- start of code -------------------------------------------------------------------------- */

impl CredentialLease {
    ///
    /// Resolve the key for a request.
    ///
    /// # Arguments
    ///  * `headers` - incoming request headers
    ///  * `scheduler` - pool scheduler used when the caller brings no key
    ///
    /// # Returns
    ///  * caller key or pool key
    ///  * `ProxyError::PoolExhausted` / `ProxyError::AllKeysExhausted` from the pool
    pub async fn acquire(headers: &HeaderMap, scheduler: &PoolScheduler) -> Result<Self> {
        match bearer_token(headers) {
            Some(key) => Ok(CredentialLease::Caller(key)),
            None => Ok(CredentialLease::Pool(scheduler.select().await?)),
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            CredentialLease::Caller(key) => key,
            CredentialLease::Pool(credential) => &credential.api_key,
        }
    }

    /// Pool id of the key, `None` for caller keys.
    pub fn pool_id(&self) -> Option<i64> {
        match self {
            CredentialLease::Caller(_) => None,
            CredentialLease::Pool(credential) => Some(credential.id),
        }
    }

    /// Masked description for logs.
    pub fn describe(&self) -> String {
        match self {
            CredentialLease::Caller(key) => format!("caller key {}", mask_secret(key)),
            CredentialLease::Pool(credential) => {
                format!("pool key #{} {}", credential.id, credential.masked_key())
            }
        }
    }
}

/// Bearer token from the `Authorization` header, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/* --- tests ------------------------------------------------------------------------------- */
