use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use picrelay_types::RepositoryId;
use serde_json::json;

use crate::api::{direct_child, ContentApi, ContentWrite, DirectoryListing, WriteOutcome};
use crate::error::{UploadError, UploadResult};

/// Where an object lives: owner, repository, branch, path.
pub type ObjectKey = (String, String, String, String);

/// A write the API was asked to perform, successful or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptedWrite {
    pub repository: RepositoryId,
    pub path: String,
    pub branch: String,
    pub message: String,
    pub size: usize,
}

/// Failure to report instead of performing the next writes.
#[derive(Clone, Debug)]
pub enum InjectedFailure {
    Transport(String),
    Reject { status: u16, body: serde_json::Value },
}

/// In-memory [`ContentApi`].
///
/// Behaves like the GitHub contents API for the calls picrelay makes:
/// creating a path that already exists is a 422 conflict, and listings only
/// show files directly inside the directory. Used by tests and by the
/// `memory:` content backend for local runs without network access.
#[derive(Debug, Default)]
pub struct InMemoryContentApi {
    objects: RwLock<BTreeMap<ObjectKey, Vec<u8>>>,
    attempts: RwLock<Vec<AttemptedWrite>>,
    failure: RwLock<Option<InjectedFailure>>,
    listing_limit: RwLock<Option<usize>>,
}

impl InMemoryContentApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following write fail this way; `None` restores normal
    /// behavior.
    pub fn fail_with(&self, failure: Option<InjectedFailure>) {
        *Self::write(&self.failure) = failure;
    }

    /// Cap listings at `limit` entries and flag them truncated, the way the
    /// GitHub API does for very large trees.
    pub fn limit_listings(&self, limit: Option<usize>) {
        *Self::write(&self.listing_limit) = limit;
    }

    /// Every write attempted so far, in call order.
    pub fn attempts(&self) -> Vec<AttemptedWrite> {
        Self::read(&self.attempts).clone()
    }

    /// Stored bytes at a location, if any.
    pub fn object(&self, owner: &str, repository: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let key = (owner.into(), repository.into(), branch.into(), path.into());
        Self::read(&self.objects).get(&key).cloned()
    }

    /// Place an object directly, bypassing `create_or_update`.
    pub fn insert_object(&self, key: ObjectKey, content: Vec<u8>) {
        Self::write(&self.objects).insert(key, content);
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        Self::read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentApi for InMemoryContentApi {
    async fn create_or_update(&self, write: &ContentWrite<'_>) -> UploadResult<WriteOutcome> {
        Self::write(&self.attempts).push(AttemptedWrite {
            repository: write.repository.clone(),
            path: write.path.to_string(),
            branch: write.branch.to_string(),
            message: write.message.to_string(),
            size: write.content.len(),
        });

        match Self::read(&self.failure).clone() {
            Some(InjectedFailure::Transport(reason)) => return Err(UploadError::Transport(reason)),
            Some(InjectedFailure::Reject { status, body }) => {
                return Ok(WriteOutcome::Rejected { status, body })
            }
            None => {}
        }

        let key = (
            write.owner.to_string(),
            write.repository.to_string(),
            write.branch.to_string(),
            write.path.to_string(),
        );
        let mut objects = Self::write(&self.objects);
        if objects.contains_key(&key) {
            return Ok(WriteOutcome::Conflict {
                status: 422,
                body: json!({"message": "Invalid request.\n\n\"sha\" wasn't supplied."}),
            });
        }
        objects.insert(key, write.content.to_vec());
        Ok(WriteOutcome::Committed)
    }

    async fn list_directory(
        &self,
        owner: &str,
        repository: &RepositoryId,
        branch: &str,
        dir: &str,
    ) -> UploadResult<DirectoryListing> {
        let objects = Self::read(&self.objects);
        let mut names: Vec<String> = objects
            .keys()
            .filter(|(o, r, b, _)| o == owner && r == repository.as_str() && b == branch)
            .filter_map(|(_, _, _, path)| direct_child(dir, path))
            .map(str::to_string)
            .collect();
        let truncated = match *Self::read(&self.listing_limit) {
            Some(limit) if names.len() > limit => {
                names.truncate(limit);
                true
            }
            _ => false,
        };
        Ok(DirectoryListing { names, truncated })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
