//!
//! In-process key store.
//!
//! Backs the `memory` database URL and the test suites. Same semantics as the
//! sqlite store, held behind a tokio `RwLock`.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{
    Credential, CredentialStore, NewCredential, PoolSetting, PoolSummary, UsageRecord,
};

/* --- types ----------------------------------------------------------------------------------- */

#[derive(Default)]
struct Inner {
    /** keyed by id so iteration is in ascending id order */
    credentials: BTreeMap<i64, Credential>,
    config: HashMap<&'static str, String>,
    usage: Vec<UsageRecord>,
    next_id: i64,
}

///
/// Key store living entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

/* --- implementations --------------------------------------------------------------------- */

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding exactly these records (ids and timestamps kept as given).
    pub fn with_credentials(credentials: Vec<Credential>) -> Self {
        let next_id = credentials.iter().map(|c| c.id).max().unwrap_or(0);
        let credentials = credentials.into_iter().map(|c| (c.id, c)).collect();
        Self { inner: RwLock::new(Inner { credentials, next_id, ..Inner::default() }) }
    }

    /// Snapshot of the usage log.
    pub async fn usage_records(&self) -> Vec<UsageRecord> {
        self.inner.read().await.usage.clone()
    }

    /// Replace a stored record wholesale.
    pub async fn put_credential(&self, credential: Credential) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(credential.id);
        inner.credentials.insert(credential.id, credential);
    }

    async fn modify<F>(&self, id: i64, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Credential, DateTime<Utc>) + Send,
    {
        let mut inner = self.inner.write().await;
        if let Some(credential) = inner.credentials.get_mut(&id) {
            apply(credential, Utc::now());
        } else {
            tracing::debug!("Credential {} not found, nothing updated", id);
        }
        Ok(())
    }
}

/// Active, or inactive with a cooldown that has fully elapsed.
pub(crate) fn is_eligible(credential: &Credential, now: DateTime<Utc>, cooldown_hours: i64) -> bool {
    if credential.active {
        return true;
    }
    match credential.last_used {
        Some(last_used) => now - last_used >= Duration::hours(cooldown_hours),
        None => false,
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn eligible_credentials(&self, cooldown_hours: i64) -> Result<Vec<Credential>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .values()
            .filter(|c| is_eligible(c, now, cooldown_hours))
            .cloned()
            .collect())
    }

    async fn get_config(&self, key: PoolSetting) -> Result<Option<String>> {
        Ok(self.inner.read().await.config.get(key.key()).cloned())
    }

    async fn set_config(&self, key: PoolSetting, value: &str) -> Result<()> {
        self.inner.write().await.config.insert(key.key(), value.to_string());
        Ok(())
    }

    async fn update_on_select(&self, id: i64) -> Result<()> {
        self.modify(id, |c, now| {
            c.total_requests += 1;
            c.last_used = Some(now);
            c.updated_at = now;
            c.active = true;
        })
        .await
    }

    async fn increment_error(&self, id: i64) -> Result<()> {
        self.modify(id, |c, now| {
            c.error_count += 1;
            c.updated_at = now;
        })
        .await
    }

    async fn disable_for_cooldown(&self, id: i64) -> Result<()> {
        self.modify(id, |c, now| {
            c.active = false;
            c.last_used = Some(now);
            c.updated_at = now;
        })
        .await
    }

    async fn append_usage(&self, record: UsageRecord) -> Result<()> {
        self.inner.write().await.usage.push(record);
        Ok(())
    }

    async fn reset_stale_errors(&self, interval_hours: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::hours(interval_hours);
        let mut inner = self.inner.write().await;
        let mut reset = 0;
        for credential in inner.credentials.values_mut() {
            if credential.error_count > 0 && credential.updated_at < cutoff {
                credential.error_count = 0;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn upsert_credential(&self, new: NewCredential) -> Result<i64> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.credentials.values_mut().find(|c| c.api_key == new.api_key) {
            existing.owner = new.owner;
            existing.active = true;
            existing.updated_at = now;
            if new.note.is_some() {
                existing.note = new.note;
            }
            return Ok(existing.id);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.credentials.insert(
            id,
            Credential {
                id,
                api_key: new.api_key,
                owner: new.owner,
                active: true,
                created_at: now,
                updated_at: now,
                last_used: None,
                total_requests: 0,
                error_count: 0,
                note: new.note,
            },
        );
        Ok(id)
    }

    async fn get_credential(&self, id: i64) -> Result<Option<Credential>> {
        Ok(self.inner.read().await.credentials.get(&id).cloned())
    }

    async fn pool_summary(&self) -> Result<PoolSummary> {
        let inner = self.inner.read().await;
        let total = inner.credentials.len() as i64;
        let active = inner.credentials.values().filter(|c| c.active).count() as i64;
        Ok(PoolSummary { total, active, inactive: total - active })
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(id: i64, active: bool, last_used: Option<DateTime<Utc>>) -> Credential {
        let now = Utc::now();
        Credential {
            id,
            api_key: format!("key-{}", id),
            owner: format!("owner{}@gmail.com", id),
            active,
            created_at: now,
            updated_at: now,
            last_used,
            total_requests: 0,
            error_count: 0,
            note: None,
        }
    }

    #[test]
    fn test_eligibility_window() {
        let now = Utc::now();
        assert!(is_eligible(&credential(1, true, None), now, 24));
        assert!(!is_eligible(&credential(1, false, None), now, 24));
        assert!(is_eligible(&credential(1, false, Some(now - Duration::hours(25))), now, 24));
        assert!(!is_eligible(&credential(1, false, Some(now - Duration::hours(1))), now, 24));
    }

    #[tokio::test]
    async fn test_upsert_reuses_existing_secret() {
        let store = MemoryStore::new();
        let first = store.upsert_credential(NewCredential::new("a@gmail.com", "k1")).await.unwrap();
        store.disable_for_cooldown(first).await.unwrap();

        let again = store.upsert_credential(NewCredential::new("b@gmail.com", "k1")).await.unwrap();
        assert_eq!(first, again);

        let stored = store.get_credential(first).await.unwrap().unwrap();
        assert_eq!(stored.owner, "b@gmail.com");
        assert!(stored.active);

        let second = store.upsert_credential(NewCredential::new("c@gmail.com", "k2")).await.unwrap();
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn test_eligible_ordered_by_id() {
        let store = MemoryStore::with_credentials(vec![
            credential(7, true, None),
            credential(2, true, None),
            credential(5, false, None),
        ]);
        let ids: Vec<i64> =
            store.eligible_credentials(24).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 7]);
    }

    #[tokio::test]
    async fn test_pool_summary_counts() {
        let store = MemoryStore::with_credentials(vec![
            credential(1, true, None),
            credential(2, false, None),
            credential(3, true, None),
        ]);
        let summary = store.pool_summary().await.unwrap();
        assert_eq!(summary, PoolSummary { total: 3, active: 2, inactive: 1 });
    }
}
