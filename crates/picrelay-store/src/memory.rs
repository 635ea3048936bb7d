use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use picrelay_types::{NewUploadRecord, UploadRecord};

use crate::error::{StoreError, StoreResult};
use crate::traits::{rotate, MetadataStore};

#[derive(Debug, Default)]
struct State {
    /// `None` until `ensure_schema` runs.
    counter: Option<u64>,
    records: Vec<UploadRecord>,
    next_id: i64,
}

/// In-process metadata store.
///
/// Intended for tests and single-process embedding. The counter and the log
/// live behind one `Mutex`, which makes every operation atomic within this
/// process. Nothing is shared between processes and everything is lost on
/// drop, so several server instances must not each hold one of these.
pub struct InMemoryMetadataStore {
    state: Mutex<State>,
}

impl InMemoryMetadataStore {
    /// Create a store with no schema yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    /// Create a store whose counter is already initialized to `counter`.
    pub fn with_counter(counter: u64) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.counter = Some(counter);
        }
        store
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Number of records in the log.
    pub fn record_count(&self) -> usize {
        self.lock().map(|s| s.records.len()).unwrap_or_default()
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.counter.get_or_insert(0);
        Ok(())
    }

    async fn read_and_advance_counter(&self, n: NonZeroU64) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let counter = state.counter.as_mut().ok_or(StoreError::SchemaMissing)?;
        let (index, next) = rotate(*counter, n);
        *counter = next;
        Ok(index)
    }

    async fn append_record(&self, record: &NewUploadRecord) -> StoreResult<UploadRecord> {
        let mut state = self.lock()?;
        if state.counter.is_none() {
            return Err(StoreError::SchemaMissing);
        }
        let id = state.next_id;
        state.next_id += 1;
        let stored = UploadRecord::from_new(id, record.clone());
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn current_counter(&self) -> StoreResult<u64> {
        self.lock()?.counter.ok_or(StoreError::SchemaMissing)
    }

    async fn list_records(&self, limit: usize) -> StoreResult<Vec<UploadRecord>> {
        let state = self.lock()?;
        if state.counter.is_none() {
            return Err(StoreError::SchemaMissing);
        }
        Ok(state.records.iter().rev().take(limit).cloned().collect())
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.counter = Some(0);
        state.records.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock().ok();
        f.debug_struct("InMemoryMetadataStore")
            .field("counter", &state.as_ref().and_then(|s| s.counter))
            .field("record_count", &state.as_ref().map(|s| s.records.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[tokio::test]
    async fn schema_missing_until_ensured() {
        let store = InMemoryMetadataStore::new();
        let n = NonZeroU64::new(2).unwrap();
        assert!(matches!(
            store.read_and_advance_counter(n).await,
            Err(StoreError::SchemaMissing)
        ));
        store.ensure_schema().await.unwrap();
        assert_eq!(store.read_and_advance_counter(n).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn with_counter_starts_mid_rotation() {
        let store = InMemoryMetadataStore::with_counter(3);
        store.ensure_schema().await.unwrap();
        assert_eq!(store.current_counter().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn debug_shows_counter() {
        let store = InMemoryMetadataStore::with_counter(2);
        let dbg = format!("{store:?}");
        assert!(dbg.contains("counter: Some(2)"));
    }

    // -----------------------------------------------------------------------
    // Shared backend behavior
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn conformance_sequential_rotation() {
        conformance::sequential_rotation(&InMemoryMetadataStore::new()).await;
    }

    #[tokio::test]
    async fn conformance_ensure_schema_is_idempotent() {
        conformance::ensure_schema_is_idempotent(&InMemoryMetadataStore::new()).await;
    }

    #[tokio::test]
    async fn conformance_append_and_list() {
        conformance::append_and_list(&InMemoryMetadataStore::new()).await;
    }

    #[tokio::test]
    async fn conformance_reset_clears_everything() {
        conformance::reset_clears_everything(&InMemoryMetadataStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn conformance_concurrent_advances() {
        let store = std::sync::Arc::new(InMemoryMetadataStore::new());
        conformance::concurrent_advances(store).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn conformance_concurrent_ensure_schema() {
        let store = std::sync::Arc::new(InMemoryMetadataStore::new());
        conformance::concurrent_ensure_schema(store).await;
    }
}
