//! Watermark persistence.
//!
//! A watermark is the timestamp of the newest sale already handled for a
//! collection. Both stores keep it monotonic: saving an older value than the
//! stored one leaves the stored one in place, so a cycle that ran from a
//! degraded (epoch) load can never rewind it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{SaleError, Stage};

/// Durable `collection -> last processed timestamp` mapping.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark, or `None` if the collection was never saved.
    async fn load(&self, collection: &str) -> Result<Option<DateTime<Utc>>, SaleError>;

    /// Upsert the watermark for `collection`.
    async fn save(&self, collection: &str, watermark: DateTime<Utc>) -> Result<(), SaleError>;
}

/// PostgreSQL-backed store. Holds the process-wide connection pool.
#[derive(Debug, Clone)]
pub struct PgWatermarkStore {
    pool: PgPool,
}

impl PgWatermarkStore {
    /// Connect a pool to the given database.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Database pool initialized ({max_connections} connections)");
        Ok(Self { pool })
    }

    /// Create the watermark table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sale_timestamps (
                collection TEXT PRIMARY KEY,
                last_sale_timestamp TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn load(&self, collection: &str) -> Result<Option<DateTime<Utc>>, SaleError> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_sale_timestamp FROM sale_timestamps WHERE collection = $1",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SaleError::storage(collection, Stage::Load, e))
    }

    async fn save(&self, collection: &str, watermark: DateTime<Utc>) -> Result<(), SaleError> {
        sqlx::query(
            r"
            INSERT INTO sale_timestamps (collection, last_sale_timestamp)
            VALUES ($1, $2)
            ON CONFLICT (collection) DO UPDATE
            SET last_sale_timestamp = GREATEST(sale_timestamps.last_sale_timestamp, EXCLUDED.last_sale_timestamp)
            ",
        )
        .bind(collection)
        .bind(watermark)
        .execute(&self.pool)
        .await
        .map_err(|e| SaleError::storage(collection, Stage::Save, e))?;
        debug!("Saved watermark for {collection}: {watermark}");
        Ok(())
    }
}

/// Process-local store; watermarks are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    watermarks: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self, collection: &str) -> Result<Option<DateTime<Utc>>, SaleError> {
        Ok(self.watermarks.read().await.get(collection).copied())
    }

    async fn save(&self, collection: &str, watermark: DateTime<Utc>) -> Result<(), SaleError> {
        let mut watermarks = self.watermarks.write().await;
        let entry = watermarks
            .entry(collection.to_string())
            .or_insert(watermark);
        *entry = (*entry).max(watermark);
        Ok(())
    }
}
