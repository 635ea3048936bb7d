use std::num::NonZeroU64;

use async_trait::async_trait;
use picrelay_types::{NewUploadRecord, UploadRecord};

use crate::error::StoreResult;

/// Owner of the rotation counter and the upload audit log.
///
/// All implementations must satisfy these invariants:
/// - Exactly one rotation row exists once `ensure_schema` has returned.
/// - `read_and_advance_counter` is linearizable: every call persists exactly
///   one increment, so K concurrent calls advance the counter K times.
/// - The audit log is append-only. Only `reset` removes rows.
/// - All backend errors are propagated, never silently ignored.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the rotation singleton and the audit log if absent.
    ///
    /// Idempotent and safe to race: a second caller never duplicates the
    /// singleton and never touches existing records.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Atomically claim the next rotation slot.
    ///
    /// Returns `counter mod n` and persists `(counter + 1) mod n` in the same
    /// atomic step.
    async fn read_and_advance_counter(&self, n: NonZeroU64) -> StoreResult<u64>;

    /// Durably append one record and return it with its assigned id.
    async fn append_record(&self, record: &NewUploadRecord) -> StoreResult<UploadRecord>;

    /// The persisted counter, without advancing it.
    async fn current_counter(&self) -> StoreResult<u64>;

    /// Up to `limit` records, newest first.
    async fn list_records(&self, limit: usize) -> StoreResult<Vec<UploadRecord>>;

    /// Explicit reinitialization: counter back to 0 and the log cleared,
    /// as one atomic step. Destructive; never called on the request path.
    async fn reset(&self) -> StoreResult<()>;

    /// Short backend name for logs and `/v1/info`.
    fn backend(&self) -> &'static str;
}

/// Rotation arithmetic shared by backends that compute it in Rust.
///
/// Returns `(index, next)` for a stored `counter`. A counter left over from
/// a larger N is normalized rather than rejected.
pub fn rotate(counter: u64, n: NonZeroU64) -> (u64, u64) {
    let n = n.get();
    let index = counter % n;
    (index, (index + 1) % n)
}
