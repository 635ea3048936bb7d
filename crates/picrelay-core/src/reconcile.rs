//! Offline comparison of the audit log against what the backing
//! repositories actually hold.

use std::collections::{BTreeMap, BTreeSet};

use picrelay_store::MetadataStore;
use picrelay_types::{RepositoryId, RepositoryList, UploadRecord};
use picrelay_upload::{ContentApi, UploaderSettings};
use serde::Serialize;

use crate::error::RelayResult;

/// Findings for one backing repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    pub repository: String,
    pub remote_objects: usize,
    pub recorded: usize,
    /// Present in the repository, absent from the log.
    pub orphaned: Vec<String>,
    /// Present in the log, absent from the repository. Left empty when the
    /// listing was truncated, since absence proves nothing then.
    pub missing: Vec<String>,
    /// The remote returned only part of the listing.
    pub truncated: bool,
}

impl RepositoryReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned.is_empty() && self.missing.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub repositories: Vec<RepositoryReport>,
    /// Records naming a repository that is no longer configured.
    pub unlisted_records: Vec<UploadRecord>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.unlisted_records.is_empty() && self.repositories.iter().all(RepositoryReport::is_consistent)
    }

    pub fn orphaned_count(&self) -> usize {
        self.repositories.iter().map(|r| r.orphaned.len()).sum()
    }

    pub fn missing_count(&self) -> usize {
        self.repositories.iter().map(|r| r.missing.len()).sum()
    }

    /// Repositories whose listing came back truncated.
    pub fn truncated_repositories(&self) -> impl Iterator<Item = &RepositoryReport> {
        self.repositories.iter().filter(|r| r.truncated)
    }

    /// Every repository was listed in full, so `missing` is exhaustive.
    pub fn is_complete(&self) -> bool {
        self.truncated_repositories().next().is_none()
    }
}

/// List every repository's upload directory and diff it against the full
/// audit log. Never writes to either side.
pub async fn reconcile(
    store: &dyn MetadataStore,
    api: &dyn ContentApi,
    repositories: &RepositoryList,
    settings: &UploaderSettings,
) -> RelayResult<ReconcileReport> {
    let records = store.list_records(usize::MAX).await?;

    let mut by_repo: BTreeMap<&RepositoryId, BTreeSet<&str>> =
        repositories.iter().map(|r| (r, BTreeSet::new())).collect();
    let mut unlisted_records = Vec::new();
    for record in &records {
        match by_repo.get_mut(&record.repository) {
            Some(names) => {
                names.insert(record.object_name.as_str());
            }
            None => unlisted_records.push(record.clone()),
        }
    }

    let mut report = ReconcileReport {
        repositories: Vec::with_capacity(repositories.len()),
        unlisted_records,
    };
    for repository in repositories.iter() {
        let listing = api
            .list_directory(&settings.owner, repository, &settings.branch, &settings.upload_dir)
            .await?;
        let truncated = listing.truncated;
        let remote: BTreeSet<String> = listing.names.into_iter().collect();
        let recorded = by_repo.get(repository).cloned().unwrap_or_default();
        if truncated {
            tracing::warn!(%repository, "listing truncated; skipping missing-object check");
        }

        let entry = RepositoryReport {
            repository: repository.to_string(),
            remote_objects: remote.len(),
            recorded: recorded.len(),
            orphaned: remote
                .iter()
                .filter(|name| !recorded.contains(name.as_str()))
                .cloned()
                .collect(),
            missing: if truncated {
                Vec::new()
            } else {
                recorded
                    .iter()
                    .filter(|name| !remote.contains(**name))
                    .map(|name| name.to_string())
                    .collect()
            },
            truncated,
        };
        if !entry.is_consistent() {
            tracing::warn!(
                %repository,
                orphaned = entry.orphaned.len(),
                missing = entry.missing.len(),
                "repository out of step with audit log"
            );
        }
        report.repositories.push(entry);
    }

    tracing::info!(
        repositories = report.repositories.len(),
        records = records.len(),
        orphaned = report.orphaned_count(),
        missing = report.missing_count(),
        complete = report.is_complete(),
        "reconciliation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use picrelay_store::InMemoryMetadataStore;
    use picrelay_types::NewUploadRecord;
    use picrelay_upload::InMemoryContentApi;

    fn settings() -> UploaderSettings {
        UploaderSettings {
            owner: "octo".into(),
            ..Default::default()
        }
    }

    fn repo(name: &str) -> RepositoryId {
        RepositoryId::new(name).unwrap()
    }

    fn remote(api: &InMemoryContentApi, repository: &str, name: &str) {
        api.insert_object(
            ("octo".into(), repository.into(), "main".into(), format!("uploads/{name}")),
            b"x".to_vec(),
        );
    }

    async fn record(store: &InMemoryMetadataStore, repository: &str, name: &str) {
        store
            .append_record(&NewUploadRecord {
                object_name: name.into(),
                public_url: format!("https://raw.example.test/octo/{repository}/main/uploads/{name}"),
                repository: repo(repository),
                uploaded_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matching_sides_are_consistent() {
        let store = InMemoryMetadataStore::with_counter(0);
        let api = InMemoryContentApi::new();
        remote(&api, "img-0", "a.png");
        record(&store, "img-0", "a.png").await;
        let repos = RepositoryList::parse_csv("img-0,img-1").unwrap();

        let report = reconcile(&store, &api, &repos, &settings()).await.unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.repositories.len(), 2);
        assert_eq!(report.repositories[0].remote_objects, 1);
        assert_eq!(report.repositories[0].recorded, 1);
        assert_eq!(report.repositories[1], RepositoryReport { repository: "img-1".into(), ..Default::default() });
    }

    #[tokio::test]
    async fn reports_orphans_missing_and_unlisted() {
        let store = InMemoryMetadataStore::with_counter(0);
        let api = InMemoryContentApi::new();
        remote(&api, "img-0", "kept.png");
        remote(&api, "img-0", "orphan.png");
        record(&store, "img-0", "kept.png").await;
        record(&store, "img-1", "gone.png").await;
        record(&store, "retired", "old.png").await;
        let repos = RepositoryList::parse_csv("img-0,img-1").unwrap();

        let report = reconcile(&store, &api, &repos, &settings()).await.unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.repositories[0].orphaned, ["orphan.png"]);
        assert!(report.repositories[0].missing.is_empty());
        assert_eq!(report.repositories[1].missing, ["gone.png"]);
        assert_eq!(report.orphaned_count(), 1);
        assert_eq!(report.missing_count(), 1);
        assert_eq!(report.unlisted_records.len(), 1);
        assert_eq!(report.unlisted_records[0].repository.as_str(), "retired");

        // Nothing was written on either side.
        assert_eq!(api.len(), 2);
        assert!(api.attempts().is_empty());
        assert_eq!(store.record_count(), 3);
    }

    #[tokio::test]
    async fn truncated_listing_reports_no_false_missing() {
        let store = InMemoryMetadataStore::with_counter(0);
        let api = InMemoryContentApi::new();
        for name in ["a.png", "b.png", "c.png"] {
            remote(&api, "img-0", name);
            record(&store, "img-0", name).await;
        }
        remote(&api, "img-0", "0-orphan.png");
        api.limit_listings(Some(2));
        let repos = RepositoryList::parse_csv("img-0").unwrap();

        let report = reconcile(&store, &api, &repos, &settings()).await.unwrap();

        let entry = &report.repositories[0];
        assert!(entry.truncated);
        assert!(entry.missing.is_empty());
        assert_eq!(entry.orphaned, ["0-orphan.png"]);
        assert!(!report.is_complete());
        assert_eq!(report.truncated_repositories().count(), 1);

        api.limit_listings(None);
        let full = reconcile(&store, &api, &repos, &settings()).await.unwrap();
        assert!(full.is_complete());
        assert_eq!(full.repositories[0].remote_objects, 4);
        assert!(full.repositories[0].missing.is_empty());
    }

    #[tokio::test]
    async fn store_without_schema_fails() {
        let store = InMemoryMetadataStore::new();
        let api = InMemoryContentApi::new();
        let repos = RepositoryList::parse_csv("img-0").unwrap();
        let err = reconcile(&store, &api, &repos, &settings()).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageUnavailable);
    }
}
