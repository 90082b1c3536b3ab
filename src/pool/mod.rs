//!
//! Key pool scheduler.
//!
//! Picks one API key per request from the persisted pool and feeds call
//! outcomes back into the key's health counters. A key is *eligible* when it
//! is active, or inactive with a cooldown that has elapsed since `last_used`.
//! It is *available* when it is eligible and below the error threshold.
//!
//! All state lives in the store. The round-robin cursor is a plain
//! read-modify-write on the `pool_config` table; two concurrent callers may
//! occasionally receive the same key.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod strategy;

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{ProxyError, Result};
use crate::store::{Credential, CredentialStore, PoolSetting, UsageRecord};

pub use strategy::SelectionStrategy;

/* --- constants ------------------------------------------------------------------------------ */

/** longest upstream error body kept in a usage record */
const MAX_ERROR_EXCERPT: usize = 500;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Effective pool settings for one scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub cooldown_hours: i64,
    pub max_error_count: i64,
    pub error_reset_interval_hours: i64,
    pub usage_tracking: bool,
    pub strategy: SelectionStrategy,
}

///
/// Stateless scheduler over a shared [`CredentialStore`].
pub struct PoolScheduler {
    /** persistent pool state */
    store: Arc<dyn CredentialStore>,
    /** fallbacks for settings missing from the store */
    defaults: PoolConfig,
}

/* --- implementations --------------------------------------------------------------------- */

impl PoolScheduler {
    pub fn new(store: Arc<dyn CredentialStore>, defaults: PoolConfig) -> Self {
        Self { store, defaults }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    ///
    /// Read the current settings from the store.
    ///
    /// Missing or unparseable values fall back to the configured seeds.
    pub async fn settings(&self) -> Result<PoolSettings> {
        Ok(PoolSettings {
            cooldown_hours: self
                .read_setting(PoolSetting::CooldownHours, self.defaults.cooldown_hours)
                .await?,
            max_error_count: self
                .read_setting(PoolSetting::MaxErrorCount, self.defaults.max_error_count)
                .await?,
            error_reset_interval_hours: self
                .read_setting(
                    PoolSetting::ErrorResetIntervalHours,
                    self.defaults.error_reset_interval_hours,
                )
                .await?,
            usage_tracking: self
                .read_setting(PoolSetting::UsageTracking, self.defaults.usage_tracking)
                .await?,
            strategy: self.read_setting(PoolSetting::Strategy, self.defaults.strategy).await?,
        })
    }

    /// Select a key with the strategy configured in the store.
    pub async fn select(&self) -> Result<Credential> {
        let settings = self.settings().await?;
        self.select_with(&settings, settings.strategy).await
    }

    ///
    /// Select a key with an explicit strategy.
    ///
    /// # Returns
    ///  * the chosen key, already counted as used
    ///  * `ProxyError::PoolExhausted` when no key is eligible
    ///  * `ProxyError::AllKeysExhausted` when every eligible key is over the error threshold
    pub async fn select_next(&self, strategy: SelectionStrategy) -> Result<Credential> {
        let settings = self.settings().await?;
        self.select_with(&settings, strategy).await
    }

    /// Count an upstream failure against a key. The threshold is applied at the next selection.
    pub async fn record_error(&self, id: i64) -> Result<()> {
        debug!("Recording error for key {}", id);
        self.store.increment_error(id).await
    }

    /// Deactivate a key after a rate-limit response and start its cooldown.
    pub async fn record_rate_limited(&self, id: i64) -> Result<()> {
        info!("Key {} rate limited, cooling down", id);
        self.store.disable_for_cooldown(id).await
    }

    /// Clear error counters of keys that have been quiet for the reset interval.
    pub async fn reset_expired_errors(&self) -> Result<u64> {
        let settings = self.settings().await?;
        let reset = self.store.reset_stale_errors(settings.error_reset_interval_hours).await?;
        if reset > 0 {
            info!("Cleared error counters on {} key(s)", reset);
        }
        Ok(reset)
    }

    /// Append a usage record when usage tracking is enabled.
    pub async fn record_usage(&self, record: UsageRecord) -> Result<()> {
        let enabled =
            self.read_setting(PoolSetting::UsageTracking, self.defaults.usage_tracking).await?;
        if enabled {
            self.store.append_usage(record).await?;
        }
        Ok(())
    }

    ///
    /// Feed a failed call back into the key's health.
    ///
    /// Upstream 429 cools the key down, other upstream statuses count as an
    /// error. Transport failures and local errors leave the key untouched.
    pub async fn record_outcome(&self, id: i64, endpoint: &str, error: &ProxyError) -> Result<()> {
        let ProxyError::Upstream { status, body } = error else {
            debug!("Not counting '{}' against key {}", error, id);
            return Ok(());
        };

        if *status == 429 {
            self.record_rate_limited(id).await?;
        } else {
            self.record_error(id).await?;
        }

        self.record_usage(UsageRecord::new(id, endpoint, *status).with_error(excerpt(body))).await
    }

    /* --- private methods ----------------------------------------------------------------- */

    async fn select_with(
        &self,
        settings: &PoolSettings,
        strategy: SelectionStrategy,
    ) -> Result<Credential> {
        let eligible = self.store.eligible_credentials(settings.cooldown_hours).await?;
        if eligible.is_empty() {
            warn!("Key pool exhausted: no key outside its cooldown");
            return Err(ProxyError::PoolExhausted);
        }

        let available: Vec<&Credential> =
            eligible.iter().filter(|c| c.error_count < settings.max_error_count).collect();
        if available.is_empty() {
            warn!(
                "All {} eligible key(s) reached the error threshold of {}",
                eligible.len(),
                settings.max_error_count
            );
            return Err(ProxyError::AllKeysExhausted);
        }

        let chosen = match strategy {
            SelectionStrategy::RoundRobin => self.pick_round_robin(&eligible, &available).await?,
            SelectionStrategy::LeastUsed => pick_least_used(&available)?,
            SelectionStrategy::Random => pick_random(&available)?,
        };

        self.store.update_on_select(chosen.id).await?;

        let mut selected = chosen.clone();
        selected.total_requests += 1;
        selected.active = true;
        debug!(
            "Selected key {} ({}) via {} from {} available / {} eligible",
            selected.id,
            selected.masked_key(),
            strategy,
            available.len(),
            eligible.len()
        );
        Ok(selected)
    }

    /// Scan forward from the persisted cursor for the next available key.
    async fn pick_round_robin<'a>(
        &self,
        eligible: &'a [Credential],
        available: &[&'a Credential],
    ) -> Result<&'a Credential> {
        let len = eligible.len();
        let mut cursor: usize = self.read_setting(PoolSetting::RoundRobinIndex, 0).await?;
        let last_count: Option<usize> = self.read_optional(PoolSetting::LastKeyCount).await?;

        if last_count != Some(len) {
            debug!("Eligible key count changed ({:?} -> {}), resetting cursor", last_count, len);
            cursor = 0;
            self.store.set_config(PoolSetting::LastKeyCount, &len.to_string()).await?;
        }

        let available_ids: HashSet<i64> = available.iter().map(|c| c.id).collect();
        for step in 0..len {
            let index = (cursor + step) % len;
            if available_ids.contains(&eligible[index].id) {
                let next = (index + 1) % len;
                self.store.set_config(PoolSetting::RoundRobinIndex, &next.to_string()).await?;
                return Ok(&eligible[index]);
            }
        }

        warn!("Round-robin scan found no available key, falling back to random");
        pick_random(available)
    }

    async fn read_optional<T: FromStr>(&self, key: PoolSetting) -> Result<Option<T>> {
        let raw = self.store.get_config(key).await?;
        Ok(raw.and_then(|value| match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Ignoring unparseable pool setting {}='{}'", key.key(), value);
                None
            }
        }))
    }

    async fn read_setting<T: FromStr>(&self, key: PoolSetting, default: T) -> Result<T> {
        Ok(self.read_optional(key).await?.unwrap_or(default))
    }
}

/* --- utility functions ------------------------------------------------------------------- */

fn pick_least_used<'a>(available: &[&'a Credential]) -> Result<&'a Credential> {
    available.iter().copied().min_by_key(|c| c.total_requests).ok_or(ProxyError::AllKeysExhausted)
}

fn pick_random<'a>(available: &[&'a Credential]) -> Result<&'a Credential> {
    available.choose(&mut rand::thread_rng()).copied().ok_or(ProxyError::AllKeysExhausted)
}

/// Char-boundary safe prefix of an upstream error body.
fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

///
/// Spawn the periodic error-reset sweep.
///
/// # Arguments
///  * `scheduler` - shared scheduler
///  * `every` - sweep period
///
/// # Returns
///  * handle of the background task (runs until aborted)
pub fn spawn_maintenance(scheduler: Arc<PoolScheduler>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = scheduler.reset_expired_errors().await {
                warn!("Error-reset sweep failed: {}", e);
            }
        }
    })
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewCredential};

    async fn scheduler_with(keys: usize) -> (PoolScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for i in 0..keys {
            store
                .upsert_credential(NewCredential::new(format!("u{}@gmail.com", i), format!("k{}", i)))
                .await
                .unwrap();
        }
        (PoolScheduler::new(store.clone(), PoolConfig::default()), store)
    }

    #[tokio::test]
    async fn test_settings_fall_back_to_defaults() {
        let (scheduler, store) = scheduler_with(0).await;
        store.set_config(PoolSetting::MaxErrorCount, "not-a-number").await.unwrap();
        store.set_config(PoolSetting::Strategy, "random").await.unwrap();

        let settings = scheduler.settings().await.unwrap();
        assert_eq!(settings.max_error_count, 5);
        assert_eq!(settings.strategy, SelectionStrategy::Random);
        assert_eq!(settings.cooldown_hours, 24);
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let (scheduler, _) = scheduler_with(0).await;
        let err = scheduler.select().await.unwrap_err();
        assert!(matches!(err, ProxyError::PoolExhausted));
    }

    #[tokio::test]
    async fn test_least_used_prefers_fewest_requests() {
        let (scheduler, store) = scheduler_with(3).await;
        store.update_on_select(1).await.unwrap();
        store.update_on_select(2).await.unwrap();

        let chosen = scheduler.select_next(SelectionStrategy::LeastUsed).await.unwrap();
        assert_eq!(chosen.id, 3);
        assert_eq!(chosen.total_requests, 1);
    }

    #[tokio::test]
    async fn test_least_used_ties_take_first() {
        let (scheduler, _) = scheduler_with(3).await;
        let chosen = scheduler.select_next(SelectionStrategy::LeastUsed).await.unwrap();
        assert_eq!(chosen.id, 1);
    }

    #[tokio::test]
    async fn test_random_only_returns_available_keys() {
        let (scheduler, store) = scheduler_with(3).await;
        for _ in 0..5 {
            store.increment_error(2).await.unwrap();
        }
        for _ in 0..20 {
            let chosen = scheduler.select_next(SelectionStrategy::Random).await.unwrap();
            assert_ne!(chosen.id, 2);
        }
    }

    #[tokio::test]
    async fn test_round_robin_skips_unavailable() {
        let (scheduler, store) = scheduler_with(3).await;
        for _ in 0..5 {
            store.increment_error(1).await.unwrap();
        }
        let picks: Vec<i64> = [
            scheduler.select().await.unwrap().id,
            scheduler.select().await.unwrap().id,
            scheduler.select().await.unwrap().id,
        ]
        .to_vec();
        assert_eq!(picks, vec![2, 3, 2]);
    }

    #[tokio::test]
    async fn test_record_outcome_routes_by_status() {
        let (scheduler, store) = scheduler_with(2).await;

        let throttled = ProxyError::Upstream { status: 429, body: "quota".into() };
        scheduler.record_outcome(1, "chat/completions", &throttled).await.unwrap();
        let bad = ProxyError::Upstream { status: 500, body: "boom".into() };
        scheduler.record_outcome(2, "chat/completions", &bad).await.unwrap();

        let first = store.get_credential(1).await.unwrap().unwrap();
        assert!(!first.active);
        assert_eq!(first.error_count, 0);

        let second = store.get_credential(2).await.unwrap().unwrap();
        assert!(second.active);
        assert_eq!(second.error_count, 1);

        let usage = store.usage_records().await;
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].status, 429);
        assert_eq!(usage[1].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_usage_tracking_can_be_disabled() {
        let (scheduler, store) = scheduler_with(1).await;
        store.set_config(PoolSetting::UsageTracking, "false").await.unwrap();

        scheduler.record_usage(UsageRecord::new(1, "embeddings", 200)).await.unwrap();
        assert!(store.usage_records().await.is_empty());
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(600);
        let cut = excerpt(&body);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_ERROR_EXCERPT + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
