//!
//! SQLite-backed key store using sqlx.
//!
//! Schema:
//! - `api_keys(id, api_key UNIQUE, gmail_email, is_active, created_at, updated_at,
//!   last_used, total_requests, error_count, note)`
//! - `usage_logs(id, api_key_id, endpoint, status_code, tokens_used, error_message, created_at)`
//! - `pool_config(key PRIMARY KEY, value, description, updated_at)`
//!
//! Timestamps are unix seconds.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::config::paths;
use crate::error::{ProxyError, Result};
use crate::store::{
    Credential, CredentialStore, NewCredential, PoolSetting, PoolSummary, UsageRecord,
};

/* --- constants ------------------------------------------------------------------------------ */

/** column list shared by every credential query */
const CREDENTIAL_COLUMNS: &str = "id, api_key, gmail_email, is_active, created_at, updated_at, \
                                  last_used, total_requests, error_count, note";

/** connections for file-backed databases */
const MAX_CONNECTIONS: u32 = 5;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Persistent [`CredentialStore`] backed by SQLite.
pub struct SqliteStore {
    /** connection pool to the database */
    pool: SqlitePool,
}

/* --- implementations --------------------------------------------------------------------- */

impl SqliteStore {
    ///
    /// Connect to a database (e.g. `"sqlite://~/keys.db"` or `"sqlite::memory:"`).
    ///
    /// Creates the file if missing and runs the schema migration. In-memory
    /// databases are pinned to a single connection so every query sees the
    /// same data.
    ///
    /// # Returns
    ///  * connected store
    ///  * `ProxyError::Storage` on connection or migration failure
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = expand_database_url(database_url)?;
        let in_memory = url.contains(":memory:");

        let opts = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        let mut pool_opts = SqlitePoolOptions::new();
        pool_opts = if in_memory {
            pool_opts
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_opts.max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_opts.connect_with(opts).await.map_err(|e| {
            ProxyError::Storage(format!("Failed to open key store '{}': {}", url, e))
        })?;
        Self::migrate(&pool).await?;

        tracing::info!("Key store ready at {}", url);
        Ok(Self { pool })
    }

    /// Create tables and indexes (idempotent).
    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                api_key         TEXT    NOT NULL UNIQUE,
                gmail_email     TEXT    NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at      INTEGER NOT NULL DEFAULT (unixepoch()),
                last_used       INTEGER,
                total_requests  INTEGER NOT NULL DEFAULT 0,
                error_count     INTEGER NOT NULL DEFAULT 0,
                note            TEXT
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS usage_logs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                api_key_id      INTEGER NOT NULL,
                endpoint        TEXT    NOT NULL,
                status_code     INTEGER NOT NULL,
                tokens_used     INTEGER NOT NULL DEFAULT 0,
                error_message   TEXT,
                created_at      INTEGER NOT NULL DEFAULT (unixepoch())
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pool_config (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                description     TEXT,
                updated_at      INTEGER NOT NULL DEFAULT (unixepoch())
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_keys_selection ON api_keys(is_active, last_used)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_logs_key ON usage_logs(api_key_id, created_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Write a full record, replacing any row with the same id.
    pub async fn put_credential(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO api_keys
                (id, api_key, gmail_email, is_active, created_at, updated_at,
                 last_used, total_requests, error_count, note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(credential.id)
        .bind(&credential.api_key)
        .bind(&credential.owner)
        .bind(credential.active)
        .bind(credential.created_at.timestamp())
        .bind(credential.updated_at.timestamp())
        .bind(credential.last_used.map(|t| t.timestamp()))
        .bind(credential.total_requests)
        .bind(credential.error_count)
        .bind(&credential.note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of rows in the usage log.
    pub async fn usage_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usage_logs").fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn eligible_credentials(&self, cooldown_hours: i64) -> Result<Vec<Credential>> {
        let cutoff = Utc::now().timestamp() - cooldown_hours * 3600;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_keys
             WHERE is_active = 1 OR (last_used IS NOT NULL AND last_used <= ?)
             ORDER BY id ASC",
            CREDENTIAL_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }

    async fn get_config(&self, key: PoolSetting) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM pool_config WHERE key = ?")
            .bind(key.key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_config(&self, key: PoolSetting, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO pool_config (key, value, description, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(key.key())
        .bind(value)
        .bind(key.description())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_on_select(&self, id: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE api_keys
             SET total_requests = total_requests + 1, last_used = ?, updated_at = ?, is_active = 1
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_error(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE api_keys SET error_count = error_count + 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn disable_for_cooldown(&self, id: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query("UPDATE api_keys SET is_active = 0, last_used = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_usage(&self, record: UsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_logs
                (api_key_id, endpoint, status_code, tokens_used, error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.credential_id)
        .bind(&record.endpoint)
        .bind(i64::from(record.status))
        .bind(record.tokens)
        .bind(&record.error)
        .bind(record.timestamp.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_stale_errors(&self, interval_hours: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - interval_hours * 3600;
        let result =
            sqlx::query("UPDATE api_keys SET error_count = 0 WHERE error_count > 0 AND updated_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_credential(&self, credential: NewCredential) -> Result<i64> {
        let now = Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO api_keys
                (api_key, gmail_email, is_active, created_at, updated_at, total_requests, error_count, note)
             VALUES (?, ?, 1, ?, ?, 0, 0, ?)
             ON CONFLICT(api_key) DO UPDATE SET
                gmail_email = excluded.gmail_email,
                updated_at = excluded.updated_at,
                is_active = 1,
                note = COALESCE(excluded.note, api_keys.note)
             RETURNING id",
        )
        .bind(&credential.api_key)
        .bind(&credential.owner)
        .bind(now)
        .bind(now)
        .bind(&credential.note)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_credential(&self, id: i64) -> Result<Option<Credential>> {
        let row = sqlx::query(&format!("SELECT {} FROM api_keys WHERE id = ?", CREDENTIAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn pool_summary(&self) -> Result<PoolSummary> {
        let (total, active): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0)
             FROM api_keys",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(PoolSummary { total, active, inactive: total - active })
    }
}

/* --- utility functions ------------------------------------------------------------------- */

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    Ok(Credential {
        id: row.try_get("id")?,
        api_key: row.try_get("api_key")?,
        owner: row.try_get("gmail_email")?,
        active: row.try_get("is_active")?,
        created_at: from_unix(row.try_get("created_at")?),
        updated_at: from_unix(row.try_get("updated_at")?),
        last_used: row.try_get::<Option<i64>, _>("last_used")?.map(from_unix),
        total_requests: row.try_get("total_requests")?,
        error_count: row.try_get("error_count")?,
        note: row.try_get("note")?,
    })
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Expand `~` and `$VAR` in the path part of a `sqlite://` URL.
fn expand_database_url(database_url: &str) -> Result<String> {
    match database_url.strip_prefix("sqlite://") {
        Some(path) if !path.is_empty() => {
            let expanded = paths::expand_path(path)?;
            Ok(format!("sqlite://{}", expanded.display()))
        }
        _ => Ok(database_url.to_string()),
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn test_upsert_conflict_updates_owner() {
        let store = memory_store().await;
        let id = store.upsert_credential(NewCredential::new("a@gmail.com", "k1")).await.unwrap();
        store.disable_for_cooldown(id).await.unwrap();

        let again = store.upsert_credential(NewCredential::new("b@gmail.com", "k1")).await.unwrap();
        assert_eq!(id, again);

        let stored = store.get_credential(id).await.unwrap().unwrap();
        assert_eq!(stored.owner, "b@gmail.com");
        assert!(stored.active);
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let store = memory_store().await;
        assert_eq!(store.get_config(PoolSetting::RoundRobinIndex).await.unwrap(), None);

        store.set_config(PoolSetting::RoundRobinIndex, "3").await.unwrap();
        store.set_config(PoolSetting::RoundRobinIndex, "4").await.unwrap();
        assert_eq!(
            store.get_config(PoolSetting::RoundRobinIndex).await.unwrap().as_deref(),
            Some("4")
        );
    }

    #[tokio::test]
    async fn test_counters_and_cooldown() {
        let store = memory_store().await;
        let id = store.upsert_credential(NewCredential::new("a@gmail.com", "k1")).await.unwrap();

        store.update_on_select(id).await.unwrap();
        store.increment_error(id).await.unwrap();
        let stored = store.get_credential(id).await.unwrap().unwrap();
        assert_eq!(stored.total_requests, 1);
        assert_eq!(stored.error_count, 1);
        assert!(stored.last_used.is_some());

        store.disable_for_cooldown(id).await.unwrap();
        assert!(store.eligible_credentials(24).await.unwrap().is_empty());
        assert_eq!(store.eligible_credentials(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_eligibility_after_cooldown() {
        let store = memory_store().await;
        let now = Utc::now();
        let mut credential = Credential {
            id: 1,
            api_key: "k1".to_string(),
            owner: "a@gmail.com".to_string(),
            active: false,
            created_at: now,
            updated_at: now,
            last_used: Some(now - chrono::Duration::hours(25)),
            total_requests: 0,
            error_count: 0,
            note: None,
        };
        store.put_credential(&credential).await.unwrap();
        assert_eq!(store.eligible_credentials(24).await.unwrap().len(), 1);

        credential.last_used = Some(now - chrono::Duration::hours(1));
        store.put_credential(&credential).await.unwrap();
        assert!(store.eligible_credentials(24).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_stale_errors() {
        let store = memory_store().await;
        let now = Utc::now();
        for (id, updated) in [(1, now - chrono::Duration::hours(3)), (2, now)] {
            store
                .put_credential(&Credential {
                    id,
                    api_key: format!("k{}", id),
                    owner: "a@gmail.com".to_string(),
                    active: true,
                    created_at: now,
                    updated_at: updated,
                    last_used: None,
                    total_requests: 0,
                    error_count: 9,
                    note: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.reset_stale_errors(1).await.unwrap(), 1);
        assert_eq!(store.get_credential(1).await.unwrap().unwrap().error_count, 0);
        assert_eq!(store.get_credential(2).await.unwrap().unwrap().error_count, 9);
    }

    #[tokio::test]
    async fn test_usage_append_and_summary() {
        let store = memory_store().await;
        let id = store.upsert_credential(NewCredential::new("a@gmail.com", "k1")).await.unwrap();
        store.upsert_credential(NewCredential::new("b@gmail.com", "k2")).await.unwrap();
        store.disable_for_cooldown(id).await.unwrap();

        store
            .append_usage(UsageRecord::new(id, "chat/completions", 429).with_error("quota"))
            .await
            .unwrap();
        assert_eq!(store.usage_count().await.unwrap(), 1);

        let summary = store.pool_summary().await.unwrap();
        assert_eq!(summary, PoolSummary { total: 2, active: 1, inactive: 1 });
    }

    #[test]
    fn test_expand_database_url_passthrough() {
        assert_eq!(expand_database_url("sqlite::memory:").unwrap(), "sqlite::memory:");
        assert_eq!(expand_database_url("sqlite:///tmp/k.db").unwrap(), "sqlite:///tmp/k.db");
    }
}
