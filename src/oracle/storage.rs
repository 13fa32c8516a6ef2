//! Persistence for bonding-curve histories.
//!
//! The tracker keeps histories in memory; a store lets them survive a restart.

use crate::oracle::bonding_curve::CurveSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Contract for curve-sample persistence.
#[async_trait]
pub trait CurveStorage: Send + Sync {
    async fn save_sample(&self, sample: &CurveSample) -> Result<()>;

    /// Samples for one address, oldest first.
    async fn load(&self, address: &str) -> Result<Vec<CurveSample>>;

    /// Every stored sample grouped by address, each group oldest first.
    async fn load_all(&self) -> Result<BTreeMap<String, Vec<CurveSample>>>;

    /// Drop an address's history. Returns the number of rows removed.
    async fn delete(&self, address: &str) -> Result<u64>;

    /// Keep only the newest `keep` samples of an address. Returns the number of rows removed.
    async fn trim(&self, address: &str, keep: usize) -> Result<u64>;

    async fn health_check(&self) -> Result<bool>;
}

#[derive(FromRow)]
struct CurveSampleRow {
    address: String,
    timestamp_ms: i64,
    market_cap: f64,
}

impl CurveSampleRow {
    fn into_sample(self) -> Option<CurveSample> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)?;
        Some(CurveSample {
            address: self.address,
            timestamp,
            market_cap: self.market_cap,
        })
    }
}

/// SQLite-backed [`CurveStorage`].
pub struct SqliteCurveStore {
    pool: Pool<Sqlite>,
}

impl SqliteCurveStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .with_context(|| format!("Failed to connect to SQLite database at {}", path))?;
        Self::create_schema(&pool).await?;
        info!("Curve store initialized at {}", path);
        Ok(Self { pool })
    }

    /// Private in-memory database; a single connection keeps it alive and shared.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS curve_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                market_cap REAL NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create curve_samples table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_curve_samples_address ON curve_samples(address, timestamp_ms);",
        )
        .execute(pool)
        .await
        .context("Failed to create curve_samples index")?;

        Ok(())
    }
}

#[async_trait]
impl CurveStorage for SqliteCurveStore {
    async fn save_sample(&self, sample: &CurveSample) -> Result<()> {
        sqlx::query("INSERT INTO curve_samples (address, timestamp_ms, market_cap) VALUES (?, ?, ?)")
            .bind(&sample.address)
            .bind(sample.timestamp.timestamp_millis())
            .bind(sample.market_cap)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to save curve sample for {}", sample.address))?;
        Ok(())
    }

    async fn load(&self, address: &str) -> Result<Vec<CurveSample>> {
        let rows: Vec<CurveSampleRow> = sqlx::query_as(
            "SELECT address, timestamp_ms, market_cap FROM curve_samples WHERE address = ? ORDER BY timestamp_ms ASC, id ASC",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load curve samples for {}", address))?;

        Ok(rows.into_iter().filter_map(CurveSampleRow::into_sample).collect())
    }

    async fn load_all(&self) -> Result<BTreeMap<String, Vec<CurveSample>>> {
        let rows: Vec<CurveSampleRow> = sqlx::query_as(
            "SELECT address, timestamp_ms, market_cap FROM curve_samples ORDER BY address ASC, timestamp_ms ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load curve samples")?;

        let mut grouped: BTreeMap<String, Vec<CurveSample>> = BTreeMap::new();
        for sample in rows.into_iter().filter_map(CurveSampleRow::into_sample) {
            grouped.entry(sample.address.clone()).or_default().push(sample);
        }
        debug!("Loaded curve histories for {} addresses", grouped.len());
        Ok(grouped)
    }

    async fn delete(&self, address: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM curve_samples WHERE address = ?")
            .bind(address)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete curve samples for {}", address))?;
        Ok(result.rows_affected())
    }

    async fn trim(&self, address: &str, keep: usize) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM curve_samples
            WHERE address = ?
              AND id NOT IN (
                SELECT id FROM curve_samples
                WHERE address = ?
                ORDER BY timestamp_ms DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(address)
        .bind(address)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to trim curve samples for {}", address))?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<bool> {
        let (one,): (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Curve store health check failed")?;
        Ok(one == 1)
    }
}
