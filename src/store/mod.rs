//!
//! Key store abstraction.
//!
//! The gateway only talks to persistence through [`CredentialStore`]: a table
//! of API keys with health counters, an append-only usage log and a key/value
//! table of pool settings. Implementations must be safe to share between
//! replicas; no scheduler state lives in process memory.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod memory;
pub mod sqlite;

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/* --- types ----------------------------------------------------------------------------------- */

///
/// One upstream API key plus its usage and health metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /** stable identity, selection order follows it */
    pub id: i64,
    /** secret value, unique across the pool */
    pub api_key: String,
    /** owner label (account mailbox) */
    pub owner: String,
    /** false while cooling down after a rate-limit signal */
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub total_requests: i64,
    pub error_count: i64,
    pub note: Option<String>,
}

///
/// Input for [`CredentialStore::upsert_credential`].
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub api_key: String,
    pub owner: String,
    pub note: Option<String>,
}

///
/// Append-only audit entry for one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub credential_id: i64,
    pub endpoint: String,
    pub status: u16,
    pub tokens: i64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

///
/// Pool headcount reported by `doctor` and `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

///
/// Persisted pool setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSetting {
    CooldownHours,
    MaxErrorCount,
    ErrorResetIntervalHours,
    UsageTracking,
    Strategy,
    RoundRobinIndex,
    LastKeyCount,
}

///
/// Narrow persistence interface consumed by the scheduler and the gateway.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Keys that are active, or inactive with a cooldown that elapsed, ordered by id.
    async fn eligible_credentials(&self, cooldown_hours: i64) -> Result<Vec<Credential>>;

    /// Raw stored value of a pool setting.
    async fn get_config(&self, key: PoolSetting) -> Result<Option<String>>;

    /// Insert or replace a pool setting.
    async fn set_config(&self, key: PoolSetting, value: &str) -> Result<()>;

    /// Count one request, stamp `last_used`/`updated_at` and re-activate the key.
    async fn update_on_select(&self, id: i64) -> Result<()>;

    /// Bump `error_count` (and `updated_at`).
    async fn increment_error(&self, id: i64) -> Result<()>;

    /// Deactivate a key and restart its cooldown clock.
    async fn disable_for_cooldown(&self, id: i64) -> Result<()>;

    async fn append_usage(&self, record: UsageRecord) -> Result<()>;

    /// Zero `error_count` on keys not updated for `interval_hours`; returns affected rows.
    async fn reset_stale_errors(&self, interval_hours: i64) -> Result<u64>;

    /// Insert a key, or refresh owner and re-activate it when the secret already exists.
    async fn upsert_credential(&self, credential: NewCredential) -> Result<i64>;

    async fn get_credential(&self, id: i64) -> Result<Option<Credential>>;

    async fn pool_summary(&self) -> Result<PoolSummary>;
}

/* --- start of code -------------------------------------------------------------------------- */

impl PoolSetting {
    pub const ALL: [PoolSetting; 7] = [
        PoolSetting::CooldownHours,
        PoolSetting::MaxErrorCount,
        PoolSetting::ErrorResetIntervalHours,
        PoolSetting::UsageTracking,
        PoolSetting::Strategy,
        PoolSetting::RoundRobinIndex,
        PoolSetting::LastKeyCount,
    ];

    /// Row key in the `pool_config` table.
    pub fn key(self) -> &'static str {
        match self {
            PoolSetting::CooldownHours => "cooldown_hours",
            PoolSetting::MaxErrorCount => "max_error_count",
            PoolSetting::ErrorResetIntervalHours => "error_reset_interval_hours",
            PoolSetting::UsageTracking => "usage_tracking_enabled",
            PoolSetting::Strategy => "selection_strategy",
            PoolSetting::RoundRobinIndex => "round_robin_index",
            PoolSetting::LastKeyCount => "last_key_count",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PoolSetting::CooldownHours => "Hours a rate-limited key is hidden from selection",
            PoolSetting::MaxErrorCount => "Error count at which a key stops being selected",
            PoolSetting::ErrorResetIntervalHours => {
                "Quiet hours after which a key's error count is cleared"
            }
            PoolSetting::UsageTracking => "Whether calls are appended to the usage log",
            PoolSetting::Strategy => "Key selection strategy (round_robin, least_used, random)",
            PoolSetting::RoundRobinIndex => "Round-robin cursor into the eligible key list",
            PoolSetting::LastKeyCount => "Eligible key count seen by the last round-robin pick",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|setting| setting.key() == key)
    }
}

impl Credential {
    /// Key rendered for logs: first and last four characters only.
    pub fn masked_key(&self) -> String {
        mask_secret(&self.api_key)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("api_key", &self.masked_key())
            .field("owner", &self.owner)
            .field("active", &self.active)
            .field("last_used", &self.last_used)
            .field("total_requests", &self.total_requests)
            .field("error_count", &self.error_count)
            .finish()
    }
}

impl NewCredential {
    pub fn new(owner: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), owner: owner.into(), note: None }
    }
}

impl UsageRecord {
    pub fn new(credential_id: i64, endpoint: &str, status: u16) -> Self {
        Self {
            credential_id,
            endpoint: endpoint.to_string(),
            status,
            tokens: 0,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tokens(mut self, tokens: i64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Mask a secret for display, keeping four characters at each end.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

///
/// Open the store selected by `store.database_url`.
///
/// # Arguments
///  * `config` - application configuration
///
/// # Returns
///  * shared store handle
///  * `ProxyError::Storage` if the sqlite database cannot be opened or migrated
pub async fn open(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory key store; pool state will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = SqliteStore::connect(&config.store.database_url).await?;
    Ok(Arc::new(store))
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("AIzaSyA1234567890abcd"), "AIza...abcd");
        assert_eq!(mask_secret("short"), "*****");
    }

    #[test]
    fn test_setting_keys_round_trip() {
        for setting in PoolSetting::ALL {
            assert_eq!(PoolSetting::from_key(setting.key()), Some(setting));
        }
        assert_eq!(PoolSetting::from_key("nope"), None);
    }

    #[test]
    fn test_debug_hides_secret() {
        let now = Utc::now();
        let credential = Credential {
            id: 1,
            api_key: "AIzaSySECRETSECRETxyz9".to_string(),
            owner: "a@gmail.com".to_string(),
            active: true,
            created_at: now,
            updated_at: now,
            last_used: None,
            total_requests: 0,
            error_count: 0,
            note: None,
        };
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("SECRETSECRET"));
        assert!(rendered.contains("AIza...xyz9"));
    }
}
