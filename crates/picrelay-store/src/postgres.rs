use std::num::NonZeroU64;
use std::time::Duration;

use async_trait::async_trait;
use picrelay_types::{NewUploadRecord, UploadRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::error::{StoreError, StoreResult};
use crate::sql::{
    index_from_next, limit_param, modulus_param, rows_to_records, stored_counter, RecordRow,
    RECORD_COLUMNS,
};
use crate::traits::MetadataStore;

/// Key for the transaction-scoped advisory lock that serializes schema
/// creation across processes ("picrelay" in ASCII).
const SCHEMA_LOCK_KEY: i64 = 0x7069_6372_656c_6179;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS rotation_state (
        id SMALLINT PRIMARY KEY CHECK (id = 1),
        counter BIGINT NOT NULL CHECK (counter >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS upload_records (
        id BIGSERIAL PRIMARY KEY,
        object_name TEXT NOT NULL,
        public_url TEXT NOT NULL,
        repository_id TEXT NOT NULL,
        uploaded_at TIMESTAMPTZ NOT NULL
    )",
    "INSERT INTO rotation_state (id, counter) VALUES (1, 0) ON CONFLICT (id) DO NOTHING",
];

/// Connection settings for [`PgMetadataStore`].
#[derive(Clone, Debug)]
pub struct PgOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Postgres-backed metadata store, the production backend.
///
/// Several server processes may share one database: the counter advance is
/// a single row-locking `UPDATE`, and concurrent `ensure_schema` calls are
/// serialized by an advisory lock because `CREATE TABLE IF NOT EXISTS` is
/// not race-free in Postgres.
pub struct PgMetadataStore {
    pool: Pool<Postgres>,
}

impl PgMetadataStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        Self::connect_with(url, PgOptions::default()).await
    }

    pub async fn connect_with(url: &str, options: PgOptions) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn read_and_advance_counter(&self, n: NonZeroU64) -> StoreResult<u64> {
        // The UPDATE takes the row lock; a concurrent caller blocks and then
        // re-reads the committed value, so no increment is lost.
        let next: Option<i64> = sqlx::query_scalar(
            "UPDATE rotation_state SET counter = (counter + 1) % $1 WHERE id = 1 RETURNING counter",
        )
        .bind(modulus_param(n))
        .fetch_optional(&self.pool)
        .await?;
        index_from_next(next.ok_or(StoreError::SchemaMissing)?, n)
    }

    async fn append_record(&self, record: &NewUploadRecord) -> StoreResult<UploadRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO upload_records (object_name, public_url, repository_id, uploaded_at)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&record.object_name)
        .bind(&record.public_url)
        .bind(record.repository.as_str())
        .bind(record.uploaded_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(UploadRecord::from_new(id, record.clone()))
    }

    async fn current_counter(&self) -> StoreResult<u64> {
        let counter: Option<i64> =
            sqlx::query_scalar("SELECT counter FROM rotation_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        stored_counter(counter.ok_or(StoreError::SchemaMissing)?)
    }

    async fn list_records(&self, limit: usize) -> StoreResult<Vec<UploadRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM upload_records ORDER BY id DESC LIMIT $1");
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_records(rows)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE upload_records RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO rotation_state (id, counter) VALUES (1, 0)
             ON CONFLICT (id) DO UPDATE SET counter = 0",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::warn!("metadata store reset: counter zeroed, audit log cleared");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

impl std::fmt::Debug for PgMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMetadataStore")
            .field("connections", &self.pool.size())
            .finish()
    }
}
