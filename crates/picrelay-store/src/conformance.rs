//! Behavior every [`MetadataStore`] backend must share, run by each
//! backend's test module.

use std::num::NonZeroU64;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use picrelay_types::{NewUploadRecord, RepositoryId};

use crate::traits::MetadataStore;

fn nz(n: u64) -> NonZeroU64 {
    NonZeroU64::new(n).unwrap()
}

pub fn record(name: &str, repo: &str, secs: i64) -> NewUploadRecord {
    NewUploadRecord {
        object_name: name.to_string(),
        public_url: format!("https://raw.example.test/owner/{repo}/main/uploads/{name}"),
        repository: RepositoryId::new(repo).unwrap(),
        uploaded_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
    }
}

pub async fn sequential_rotation(store: &dyn MetadataStore) {
    store.ensure_schema().await.unwrap();
    for n in [1u64, 2, 3, 4, 7] {
        let c0 = store.current_counter().await.unwrap();
        let m = 3 * n + 1;
        for i in 0..m {
            let index = store.read_and_advance_counter(nz(n)).await.unwrap();
            assert_eq!(index, (c0 + i) % n, "n={n} i={i} c0={c0}");
        }
        assert_eq!(store.current_counter().await.unwrap(), (c0 + m) % n);
    }
}

pub async fn ensure_schema_is_idempotent(store: &dyn MetadataStore) {
    store.ensure_schema().await.unwrap();
    store.read_and_advance_counter(nz(5)).await.unwrap();
    store.read_and_advance_counter(nz(5)).await.unwrap();
    store.append_record(&record("a.png", "img-0", 10)).await.unwrap();

    for _ in 0..3 {
        store.ensure_schema().await.unwrap();
    }

    assert_eq!(store.current_counter().await.unwrap(), 2);
    assert_eq!(store.list_records(10).await.unwrap().len(), 1);
}

pub async fn append_and_list(store: &dyn MetadataStore) {
    store.ensure_schema().await.unwrap();
    let first = store.append_record(&record("a.png", "img-0", 100)).await.unwrap();
    let second = store.append_record(&record("b.png", "img-1", 200)).await.unwrap();
    let third = store.append_record(&record("c.png", "img-0", 300)).await.unwrap();
    assert!(first.id < second.id && second.id < third.id);

    let all = store.list_records(10).await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.object_name.as_str()).collect();
    assert_eq!(names, ["c.png", "b.png", "a.png"]);
    assert_eq!(all[1], second);
    assert_eq!(all[1].repository.as_str(), "img-1");
    assert_eq!(all[1].uploaded_at.timestamp(), 200);

    assert_eq!(store.list_records(2).await.unwrap().len(), 2);
    assert!(store.list_records(0).await.unwrap().is_empty());
}

pub async fn reset_clears_everything(store: &dyn MetadataStore) {
    store.ensure_schema().await.unwrap();
    for _ in 0..3 {
        store.read_and_advance_counter(nz(4)).await.unwrap();
    }
    store.append_record(&record("a.png", "img-0", 1)).await.unwrap();

    store.reset().await.unwrap();

    assert_eq!(store.current_counter().await.unwrap(), 0);
    assert!(store.list_records(10).await.unwrap().is_empty());
    assert_eq!(store.read_and_advance_counter(nz(4)).await.unwrap(), 0);
}

pub async fn concurrent_advances<S: MetadataStore + 'static>(store: Arc<S>) {
    const K: u64 = 64;
    const N: u64 = 5;
    store.ensure_schema().await.unwrap();

    let handles: Vec<_> = (0..K)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.read_and_advance_counter(nz(N)).await.unwrap() })
        })
        .collect();

    let mut indices = Vec::with_capacity(K as usize);
    for handle in handles {
        indices.push(handle.await.unwrap());
    }
    indices.sort_unstable();

    // Linearizable claims hand out counter states 0..K in some order.
    let mut expected: Vec<u64> = (0..K).map(|i| i % N).collect();
    expected.sort_unstable();
    assert_eq!(indices, expected);
    assert_eq!(store.current_counter().await.unwrap(), K % N);
}

pub async fn concurrent_ensure_schema<S: MetadataStore + 'static>(store: Arc<S>) {
    store.ensure_schema().await.unwrap();
    store.append_record(&record("keep.png", "img-0", 5)).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.ensure_schema().await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.current_counter().await.unwrap(), 0);
    assert_eq!(store.read_and_advance_counter(nz(3)).await.unwrap(), 0);
    assert_eq!(store.current_counter().await.unwrap(), 1);
    let records = store.list_records(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].object_name, "keep.png");
}

/// Two handles onto one database, as two server processes would hold,
/// interleave schema checks with counter claims. Every call succeeds and no
/// claim is lost.
pub async fn shared_between_handles<S: MetadataStore + 'static>(a: Arc<S>, b: Arc<S>) {
    const CLAIMS: u64 = 90;
    const SCHEMA_CALLS: u64 = 10;
    const N: u64 = 4;

    let mut handles = Vec::new();
    for i in 0..CLAIMS + SCHEMA_CALLS {
        let store = if i % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
        handles.push(tokio::spawn(async move {
            if i % 10 == 9 {
                store.ensure_schema().await.map(|_| None)
            } else {
                store.read_and_advance_counter(nz(N)).await.map(Some)
            }
        }));
    }

    let mut claimed = 0u64;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, CLAIMS);
    assert_eq!(a.current_counter().await.unwrap(), CLAIMS % N);
    assert_eq!(b.current_counter().await.unwrap(), CLAIMS % N);
}
