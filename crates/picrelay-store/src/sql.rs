//! Pieces shared by the SQL backends.

use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use picrelay_types::{RepositoryId, UploadRecord};

use crate::error::{StoreError, StoreResult};

/// Column list every record query selects, in `RecordRow` order.
pub(crate) const RECORD_COLUMNS: &str =
    "id, object_name, public_url, repository_id, uploaded_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    id: i64,
    object_name: String,
    public_url: String,
    repository_id: String,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for UploadRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> StoreResult<Self> {
        let repository = RepositoryId::new(row.repository_id)
            .map_err(|e| StoreError::Corrupt(format!("upload_records.id={}: {e}", row.id)))?;
        Ok(UploadRecord {
            id: row.id,
            object_name: row.object_name,
            public_url: row.public_url,
            repository,
            uploaded_at: row.uploaded_at,
        })
    }
}

pub(crate) fn rows_to_records(rows: Vec<RecordRow>) -> StoreResult<Vec<UploadRecord>> {
    rows.into_iter().map(UploadRecord::try_from).collect()
}

/// N as a SQL integer. Repository lists are tiny, so this never saturates.
pub(crate) fn modulus_param(n: NonZeroU64) -> i64 {
    i64::try_from(n.get()).unwrap_or(i64::MAX)
}

/// Recover the claimed index from the `next` value an
/// `UPDATE ... SET counter = (counter + 1) % n RETURNING counter` produced.
pub(crate) fn index_from_next(next: i64, n: NonZeroU64) -> StoreResult<u64> {
    let next = stored_counter(next)?;
    let n = n.get();
    Ok((next + n - 1) % n)
}

pub(crate) fn stored_counter(raw: i64) -> StoreResult<u64> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative rotation counter {raw}")))
}

pub(crate) fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_from_next_inverts_advance() {
        let n = NonZeroU64::new(4).unwrap();
        assert_eq!(index_from_next(1, n).unwrap(), 0);
        assert_eq!(index_from_next(0, n).unwrap(), 3);
        let one = NonZeroU64::new(1).unwrap();
        assert_eq!(index_from_next(0, one).unwrap(), 0);
    }

    #[test]
    fn negative_counter_is_corrupt() {
        assert!(matches!(stored_counter(-1), Err(StoreError::Corrupt(_))));
    }
}
