use async_trait::async_trait;
use picrelay_types::RepositoryId;

use crate::error::UploadResult;

/// One create-or-update request against a backing repository.
#[derive(Clone, Copy, Debug)]
pub struct ContentWrite<'a> {
    pub owner: &'a str,
    pub repository: &'a RepositoryId,
    /// Slash-separated path inside the repository, e.g. `uploads/x.png`.
    pub path: &'a str,
    pub branch: &'a str,
    pub message: &'a str,
    /// Raw bytes; API implementations apply their own wire encoding.
    pub content: &'a [u8],
}

/// What the remote made of a write it received.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Committed,
    /// The path already exists or the write raced another one.
    Conflict { status: u16, body: serde_json::Value },
    /// Any other refusal: bad credentials, missing repository, quota.
    Rejected { status: u16, body: serde_json::Value },
}

/// Files found directly under one directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub names: Vec<String>,
    /// The remote stopped short of the full listing; `names` is a subset.
    pub truncated: bool,
}

/// Capability to write files into a remote content repository.
///
/// Implementations return `Err` only for transport-level failures; every
/// answer the remote actually gave is a [`WriteOutcome`].
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn create_or_update(&self, write: &ContentWrite<'_>) -> UploadResult<WriteOutcome>;

    /// File names directly under `dir` on `branch`. A missing directory,
    /// branch or repository is an empty listing.
    async fn list_directory(
        &self,
        owner: &str,
        repository: &RepositoryId,
        branch: &str,
        dir: &str,
    ) -> UploadResult<DirectoryListing>;

    /// Short name for logs and `/v1/info`.
    fn name(&self) -> &'static str;
}

/// The part of `path` after `dir/` when `path` sits directly inside `dir`.
/// An empty `dir` is the repository root.
pub(crate) fn direct_child<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    let dir = dir.trim_matches('/');
    let rest = if dir.is_empty() {
        path
    } else {
        path.strip_prefix(dir)?.strip_prefix('/')?
    };
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_child_only_matches_one_level() {
        assert_eq!(direct_child("uploads", "uploads/a.png"), Some("a.png"));
        assert_eq!(direct_child("/uploads/", "uploads/a.png"), Some("a.png"));
        assert_eq!(direct_child("uploads", "uploads/deep/a.png"), None);
        assert_eq!(direct_child("uploads", "uploads-old/a.png"), None);
        assert_eq!(direct_child("uploads", "uploads"), None);
        assert_eq!(direct_child("", "a.png"), Some("a.png"));
        assert_eq!(direct_child("", "uploads/a.png"), None);
    }
}
