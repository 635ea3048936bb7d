use std::num::NonZeroU64;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use picrelay_types::{NewUploadRecord, UploadRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error::{StoreError, StoreResult};
use crate::sql::{
    index_from_next, limit_param, modulus_param, rows_to_records, stored_counter, RecordRow,
    RECORD_COLUMNS,
};
use crate::traits::MetadataStore;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS rotation_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        counter INTEGER NOT NULL CHECK (counter >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS upload_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_name TEXT NOT NULL,
        public_url TEXT NOT NULL,
        repository_id TEXT NOT NULL,
        uploaded_at TEXT NOT NULL
    )",
    "INSERT INTO rotation_state (id, counter) VALUES (1, 0) ON CONFLICT (id) DO NOTHING",
];

/// SQLite-backed metadata store.
///
/// Suited to single-host deployments and to tests that want real
/// transactional semantics. The pool holds exactly one connection, so
/// writers queue instead of failing with "database is locked".
pub struct SqliteMetadataStore {
    pool: Pool<Sqlite>,
}

impl SqliteMetadataStore {
    /// Open (creating if needed) a database file in WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::with_options(opts).await
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite://picrelay.db` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::with_options(opts).await
    }

    async fn with_options(opts: SqliteConnectOptions) -> StoreResult<Self> {
        // A single long-lived connection also keeps `:memory:` databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        // Each statement is idempotent and runs in autocommit mode. A deferred
        // transaction would read first and then fail its write upgrade with
        // SQLITE_BUSY_SNAPSHOT whenever another connection wrote in between.
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn read_and_advance_counter(&self, n: NonZeroU64) -> StoreResult<u64> {
        // One UPDATE is one atomic read-modify-write.
        let next: Option<i64> = sqlx::query_scalar(
            "UPDATE rotation_state SET counter = (counter + 1) % ? WHERE id = 1 RETURNING counter",
        )
        .bind(modulus_param(n))
        .fetch_optional(&self.pool)
        .await?;
        index_from_next(next.ok_or(StoreError::SchemaMissing)?, n)
    }

    async fn append_record(&self, record: &NewUploadRecord) -> StoreResult<UploadRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO upload_records (object_name, public_url, repository_id, uploaded_at)
             VALUES (?, ?, ?, ?) RETURNING id",
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
        let sql = format!("SELECT {RECORD_COLUMNS} FROM upload_records ORDER BY id DESC LIMIT ?");
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_records(rows)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM upload_records").execute(&mut *tx).await?;
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
        "sqlite"
    }
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore")
            .field("connections", &self.pool.size())
            .finish()
    }
}
