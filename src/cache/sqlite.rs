//! Sqlite-backed cache store.
//!
//! Persists the cache row `(query_key, platform_set, filters_hash,
//! results_json, created_at, expires_at)` with a unique index on the key
//! triple; `save` upserts, superseding the prior entry for the key.

use super::{CacheError, CacheStore};
use crate::records::{CacheEntry, ProductRecord, QueryKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS search_cache (
    query_key    TEXT NOT NULL,
    platform_set TEXT NOT NULL,
    filters_hash TEXT NOT NULL,
    results_json TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    expires_at   INTEGER NOT NULL,
    UNIQUE (query_key, platform_set, filters_hash)
)
";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the cache database at `path`. Pass
    /// `":memory:"` for an ephemeral store.
    pub async fn connect(path: &str) -> Result<Self, CacheError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };

        // A single connection keeps the in-memory variant coherent and is
        // plenty for a cache written once per crawl.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn load(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            "SELECT results_json, created_at, expires_at
             FROM search_cache
             WHERE query_key = ?1 AND platform_set = ?2 AND filters_hash = ?3",
        )
        .bind(key.query())
        .bind(key.platform_set())
        .bind(format!("{:016x}", key.filters_hash()))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let results_json: String = row.try_get("results_json")?;
        let created_at: i64 = row.try_get("created_at")?;
        let expires_at: i64 = row.try_get("expires_at")?;

        let results: Vec<ProductRecord> = serde_json::from_str(&results_json)?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            results,
            created_at: timestamp(created_at)?,
            expires_at: timestamp(expires_at)?,
        }))
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let results_json = serde_json::to_string(&entry.results)?;

        sqlx::query(
            "INSERT INTO search_cache
                 (query_key, platform_set, filters_hash, results_json, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (query_key, platform_set, filters_hash) DO UPDATE SET
                 results_json = excluded.results_json,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
        )
        .bind(entry.key.query())
        .bind(entry.key.platform_set())
        .bind(format!("{:016x}", entry.key.filters_hash()))
        .bind(results_json)
        .bind(entry.created_at.timestamp())
        .bind(entry.expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| CacheError::Storage(format!("timestamp out of range: {secs}")))
}
