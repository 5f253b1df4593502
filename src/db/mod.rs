use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::models::{WarningRecord, WarningStatus};

#[cfg(test)]
pub mod memory;
pub mod queries;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(queries::CREATE_WARNINGS_TABLE)
        .execute(pool)
        .await?;
    sqlx::query(queries::CREATE_EXPIRED_INDEX)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persistence of warning records. Only the poll cycle writes.
#[async_trait]
pub trait WarningStore: Send + Sync {
    /// Upserts every record in one atomic batch.
    async fn save_all(&self, records: &[WarningRecord], now: DateTime<Utc>) -> Result<()>;

    async fn find_active(&self) -> Result<Vec<WarningRecord>>;

    async fn find_expired(&self) -> Result<Vec<WarningRecord>>;

    async fn find_expired_ids(&self) -> Result<Vec<i64>>;

    async fn find_undelivered(&self) -> Result<Vec<WarningRecord>>;

    /// Deletes records whose expiry is strictly before `cutoff`.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn find_by_status(&self, status: WarningStatus) -> Result<Vec<WarningRecord>> {
        match status {
            WarningStatus::Active => self.find_active().await,
            WarningStatus::Expired => self.find_expired().await,
        }
    }
}

pub struct PgWarningStore {
    pool: DbPool,
}

impl PgWarningStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_records(&self, query: &'static str) -> Result<Vec<WarningRecord>> {
        let records = sqlx::query_as::<_, WarningRecord>(query)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn fetch_ids(&self, query: &'static str) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(query).fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl WarningStore for PgWarningStore {
    async fn save_all(&self, records: &[WarningRecord], now: DateTime<Utc>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(queries::UPSERT_WARNING)
                .bind(record.id)
                .bind(&record.raw_payload)
                .bind(&record.document)
                .bind(record.created_time)
                .bind(record.expired_time)
                .bind(record.delivery_time)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Saved {} warning records", records.len());
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<WarningRecord>> {
        self.fetch_records(queries::SELECT_ACTIVE).await
    }

    async fn find_expired(&self) -> Result<Vec<WarningRecord>> {
        self.fetch_records(queries::SELECT_EXPIRED).await
    }

    async fn find_expired_ids(&self) -> Result<Vec<i64>> {
        self.fetch_ids(queries::SELECT_EXPIRED_IDS).await
    }

    async fn find_undelivered(&self) -> Result<Vec<WarningRecord>> {
        self.fetch_records(queries::SELECT_UNDELIVERED).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(queries::DELETE_EXPIRED_BEFORE)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
