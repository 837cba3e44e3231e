//! SQLite cache for the normalized dataset
//!
//! The source workbook is read-only for a session, so the normalized records
//! are stored per source key and reused until a refresh is requested.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;

use crate::records::{MetricValues, Record};

/// Cache database wrapper
pub struct Cache {
    pool: SqlitePool,
}

/// Row type for records query
#[derive(FromRow)]
struct RecordRow {
    year: i64,
    month: i64,
    member_category: Option<String>,
    status: Option<String>,
    headcount: f64,
    transactions: f64,
    revenue: f64,
}

impl Cache {
    /// Open or create cache database
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // SQLx requires the file to exist for SQLite
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite:{}", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("Failed to open cache database")?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        let cache = Self { pool };
        cache.init_schema().await?;

        Ok(cache)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            -- Normalized records per source
            CREATE TABLE IF NOT EXISTS records (
                source_key TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                member_category TEXT,
                status TEXT,
                headcount REAL NOT NULL,
                transactions REAL NOT NULL,
                revenue REAL NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_key)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "
            -- One row per cached source (present even when it had zero records)
            CREATE TABLE IF NOT EXISTS sources (
                source_key TEXT PRIMARY KEY,
                record_count INTEGER NOT NULL,
                loaded_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// When the source was cached, if it is cached at all
    pub async fn loaded_at(&self, source_key: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT loaded_at FROM sources WHERE source_key = ?")
                .bind(source_key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(s,)| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }

    /// Get cached records for a source (None when the source was never cached)
    pub async fn get_records(&self, source_key: &str) -> Result<Option<Vec<Record>>> {
        if self.loaded_at(source_key).await?.is_none() {
            return Ok(None);
        }

        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT year, month, member_category, status, headcount, transactions, revenue
             FROM records
             WHERE source_key = ?
             ORDER BY rowid",
        )
        .bind(source_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(rows.into_iter().filter_map(row_to_record).collect()))
    }

    /// Replace the cached records for a source (in a transaction for atomicity)
    pub async fn store_records(
        &self,
        source_key: &str,
        records: &[Record],
        loaded_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records WHERE source_key = ?")
            .bind(source_key)
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(
                "INSERT INTO records
                 (source_key, year, month, member_category, status,
                  headcount, transactions, revenue)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(source_key)
            .bind(record.year as i64)
            .bind(record.month as i64)
            .bind(record.member_category.map(|c| c.to_string()))
            .bind(record.status.map(|s| s.to_string()))
            .bind(record.metrics.headcount)
            .bind(record.metrics.transactions)
            .bind(record.metrics.revenue)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO sources (source_key, record_count, loaded_at) VALUES (?, ?, ?)",
        )
        .bind(source_key)
        .bind(records.len() as i64)
        .bind(loaded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Drop a cached source; returns whether anything was removed
    pub async fn clear(&self, source_key: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE source_key = ?")
            .bind(source_key)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE source_key = ?")
            .bind(source_key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        let sources: Vec<(String, i64, String)> = sqlx::query_as(
            "SELECT source_key, record_count, loaded_at FROM sources ORDER BY source_key",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(CacheStats {
            sources: sources
                .into_iter()
                .map(|(source_key, records, loaded_at)| CachedSource {
                    source_key,
                    records: records as u64,
                    loaded_at,
                })
                .collect(),
        })
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Convert a RecordRow to a Record (unknown labels become None; rows whose
/// year or month don't fit are dropped)
fn row_to_record(r: RecordRow) -> Option<Record> {
    Some(Record {
        year: i32::try_from(r.year).ok()?,
        month: u32::try_from(r.month).ok()?,
        member_category: r.member_category.and_then(|s| s.parse().ok()),
        status: r.status.and_then(|s| s.parse().ok()),
        metrics: MetricValues {
            headcount: r.headcount,
            transactions: r.transactions,
            revenue: r.revenue,
        },
    })
}

/// One cached source
#[derive(Debug)]
pub struct CachedSource {
    pub source_key: String,
    pub records: u64,
    pub loaded_at: String,
}

/// Cache statistics
#[derive(Debug)]
pub struct CacheStats {
    pub sources: Vec<CachedSource>,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records: u64 = self.sources.iter().map(|s| s.records).sum();
        write!(f, "{} source(s), {} records", self.sources.len(), records)
    }
}
