use std::sync::Arc;

use picrelay_store::MetadataStore;
use picrelay_types::{sanitize_file_name, NewUploadRecord, UploadRecord};
use picrelay_upload::ObjectUploader;
use tokio::sync::OnceCell;

use crate::allocator::{Allocation, RepositoryAllocator};
use crate::error::{RelayError, RelayResult};

/// Outcome of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub public_url: String,
    pub allocation: Allocation,
    pub record: UploadRecord,
}

/// Runs the upload pipeline for one request at a time, any number of
/// requests concurrently:
///
/// 1. ensure the store schema (once per process),
/// 2. claim a rotation slot,
/// 3. commit the object to the claimed repository,
/// 4. append the audit record,
/// 5. hand back the public address.
///
/// There is no rollback. A slot claimed in step 2 stays spent when step 3
/// fails, and an object committed in step 3 stays in its repository when
/// step 4 fails. Both outcomes are reported to the caller and logged.
pub struct UploadOrchestrator {
    store: Arc<dyn MetadataStore>,
    allocator: RepositoryAllocator,
    uploader: ObjectUploader,
    schema_ready: OnceCell<()>,
}

impl UploadOrchestrator {
    /// `allocator` must draw on the same store as `store`.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        allocator: RepositoryAllocator,
        uploader: ObjectUploader,
    ) -> Self {
        Self {
            store,
            allocator,
            uploader,
            schema_ready: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn allocator(&self) -> &RepositoryAllocator {
        &self.allocator
    }

    pub fn uploader(&self) -> &ObjectUploader {
        &self.uploader
    }

    /// Ensure the schema unless an earlier call already succeeded. A failed
    /// attempt is not remembered; the next request tries again.
    pub async fn ensure_schema(&self) -> RelayResult<()> {
        self.schema_ready
            .get_or_try_init(|| async { self.store.ensure_schema().await })
            .await?;
        Ok(())
    }

    pub async fn handle_upload(&self, original_name: &str, content: &[u8]) -> RelayResult<UploadReceipt> {
        if content.is_empty() {
            return Err(RelayError::InvalidInput("uploaded file is empty".into()));
        }
        sanitize_file_name(original_name).map_err(|e| RelayError::InvalidInput(e.to_string()))?;

        self.ensure_schema().await?;

        let allocation = self.allocator.next_repository().await?;
        tracing::info!(
            index = allocation.index,
            repository = %allocation.repository,
            "rotation slot claimed"
        );

        let stored = match self
            .uploader
            .put_object(&allocation.repository, original_name, content)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    index = allocation.index,
                    repository = %allocation.repository,
                    error = %e,
                    "upload failed; rotation slot stays spent"
                );
                return Err(e.into());
            }
        };

        let new_record = NewUploadRecord {
            object_name: stored.name.to_string(),
            public_url: stored.public_url.clone(),
            repository: allocation.repository.clone(),
            uploaded_at: stored.uploaded_at,
        };
        let record = match self.store.append_record(&new_record).await {
            Ok(record) => record,
            Err(source) => {
                tracing::error!(
                    public_url = %stored.public_url,
                    repository = %allocation.repository,
                    error = %source,
                    "object stored but audit record not written"
                );
                return Err(RelayError::RecordFailed {
                    public_url: stored.public_url,
                    source,
                });
            }
        };

        tracing::info!(id = record.id, public_url = %record.public_url, "upload recorded");
        Ok(UploadReceipt {
            public_url: stored.public_url,
            allocation,
            record,
        })
    }
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("allocator", &self.allocator)
            .field("uploader", &self.uploader)
            .field("schema_ready", &self.schema_ready.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use picrelay_store::{InMemoryMetadataStore, StoreError, StoreResult};
    use picrelay_types::{RepositoryId, RepositoryList, TIMESTAMP_LEN};
    use picrelay_upload::{InMemoryContentApi, InjectedFailure, UploaderSettings};
    use serde_json::json;
    use std::num::NonZeroU64;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory store whose schema and append steps can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryMetadataStore,
        fail_schema: AtomicBool,
        fail_append: AtomicBool,
        schema_calls: AtomicUsize,
    }

    impl FlakyStore {
        fn with_counter(counter: u64) -> Self {
            Self {
                inner: InMemoryMetadataStore::with_counter(counter),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MetadataStore for FlakyStore {
        async fn ensure_schema(&self) -> StoreResult<()> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_schema.load(Ordering::SeqCst) {
                return Err(StoreError::Corrupt("database is down".into()));
            }
            self.inner.ensure_schema().await
        }
        async fn read_and_advance_counter(&self, n: NonZeroU64) -> StoreResult<u64> {
            self.inner.read_and_advance_counter(n).await
        }
        async fn append_record(&self, record: &NewUploadRecord) -> StoreResult<UploadRecord> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(StoreError::Corrupt("disk full".into()));
            }
            self.inner.append_record(record).await
        }
        async fn current_counter(&self) -> StoreResult<u64> {
            self.inner.current_counter().await
        }
        async fn list_records(&self, limit: usize) -> StoreResult<Vec<UploadRecord>> {
            self.inner.list_records(limit).await
        }
        async fn reset(&self) -> StoreResult<()> {
            self.inner.reset().await
        }
        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    const REPO_LIST: [&str; 4] = ["img-0", "img-1", "img-2", "img-3"];

    struct Harness {
        store: Arc<FlakyStore>,
        api: Arc<InMemoryContentApi>,
        orchestrator: UploadOrchestrator,
    }

    fn harness(store: FlakyStore) -> Harness {
        let store = Arc::new(store);
        let api = Arc::new(InMemoryContentApi::new());
        let repositories = RepositoryList::new(
            REPO_LIST.iter().map(|r| RepositoryId::new(*r).unwrap()).collect(),
        )
        .unwrap();
        let allocator = RepositoryAllocator::new(store.clone(), repositories);
        let uploader = ObjectUploader::new(
            api.clone(),
            UploaderSettings {
                owner: "octo".into(),
                unique_names: false,
                ..Default::default()
            },
        )
        .unwrap();
        Harness {
            orchestrator: UploadOrchestrator::new(store.clone(), allocator, uploader),
            store,
            api,
        }
    }

    #[tokio::test]
    async fn first_upload_goes_to_first_repository() {
        let h = harness(FlakyStore::default());

        let receipt = h.orchestrator.handle_upload("cat.png", b"\x89PNG...").await.unwrap();

        assert_eq!(receipt.allocation.index, 0);
        let attempts = h.api.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].repository.as_str(), REPO_LIST[0]);

        let file = receipt.public_url.rsplit('/').next().unwrap();
        assert!(file.ends_with("_cat.png"));
        assert!(file[..TIMESTAMP_LEN].chars().all(|c| c.is_ascii_digit()));
        assert!(receipt.public_url.starts_with("https://raw.githubusercontent.com/octo/img-0/main/uploads/"));

        let records = h.store.list_records(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].repository.as_str(), REPO_LIST[0]);
        assert_eq!(records[0].public_url, receipt.public_url);
        assert_eq!(records[0], receipt.record);
    }

    #[tokio::test]
    async fn rotation_wraps_around() {
        let h = harness(FlakyStore::with_counter(3));

        let first = h.orchestrator.handle_upload("a.png", b"a").await.unwrap();
        let second = h.orchestrator.handle_upload("b.png", b"b").await.unwrap();

        assert_eq!(first.allocation.index, 3);
        assert_eq!(first.allocation.repository.as_str(), "img-3");
        assert_eq!(second.allocation.index, 0);
        assert_eq!(second.allocation.repository.as_str(), "img-0");
        assert_eq!(h.store.current_counter().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transport_failure_spends_slot_without_record() {
        let h = harness(FlakyStore::default());
        h.api.fail_with(Some(InjectedFailure::Transport("connection refused".into())));

        let err = h.orchestrator.handle_upload("cat.png", b"x").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UploadTransportError);
        assert!(h.store.list_records(10).await.unwrap().is_empty());
        // The claimed slot is not given back.
        assert_eq!(h.store.current_counter().await.unwrap(), 1);

        h.api.fail_with(None);
        let next = h.orchestrator.handle_upload("cat.png", b"x").await.unwrap();
        assert_eq!(next.allocation.index, 1);
    }

    #[tokio::test]
    async fn rejection_carries_remote_body() {
        let h = harness(FlakyStore::default());
        h.api.fail_with(Some(InjectedFailure::Reject {
            status: 401,
            body: json!({"message": "Bad credentials"}),
        }));

        match h.orchestrator.handle_upload("cat.png", b"x").await.unwrap_err() {
            RelayError::UploadRejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body["message"], "Bad credentials");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.store.list_records(10).await.unwrap().is_empty());
        assert_eq!(h.store.current_counter().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_append_leaves_unrecorded_object() {
        let h = harness(FlakyStore::default());
        h.store.fail_append.store(true, Ordering::SeqCst);

        let err = h.orchestrator.handle_upload("cat.png", b"x").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        let RelayError::RecordFailed { public_url, .. } = err else {
            panic!("expected RecordFailed");
        };
        // The object is in the repository but not in the log.
        assert_eq!(h.api.len(), 1);
        assert!(public_url.contains("/img-0/"));
        assert!(h.store.list_records(10).await.unwrap().is_empty());
        assert_eq!(h.store.current_counter().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_input_has_no_side_effects() {
        let h = harness(FlakyStore::with_counter(2));

        for (name, bytes) in [("cat.png", &b""[..]), ("", &b"x"[..]), ("dir/", &b"x"[..])] {
            let err = h.orchestrator.handle_upload(name, bytes).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{name:?}");
        }

        assert_eq!(h.store.schema_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.current_counter().await.unwrap(), 2);
        assert!(h.api.attempts().is_empty());
        assert!(h.store.list_records(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_failure_stops_before_allocation_and_is_retried() {
        let h = harness(FlakyStore::default());
        h.store.fail_schema.store(true, Ordering::SeqCst);

        let err = h.orchestrator.handle_upload("cat.png", b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(h.api.attempts().is_empty());

        h.store.fail_schema.store(false, Ordering::SeqCst);
        h.orchestrator.handle_upload("cat.png", b"x").await.unwrap();
        h.orchestrator.handle_upload("dog.png", b"y").await.unwrap();
        assert_eq!(h.store.schema_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_spread_evenly() {
        let h = harness(FlakyStore::default());
        let orchestrator = Arc::new(h.orchestrator);

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator
                        .handle_upload(&format!("pic-{i}.png"), b"data")
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut per_repo = [0usize; 4];
        for attempt in h.api.attempts() {
            let i = REPO_LIST.iter().position(|r| *r == attempt.repository.as_str()).unwrap();
            per_repo[i] += 1;
        }
        assert_eq!(per_repo, [10, 10, 10, 10]);
        assert_eq!(h.store.list_records(100).await.unwrap().len(), 40);
        assert_eq!(h.store.current_counter().await.unwrap(), 0);
    }
}
