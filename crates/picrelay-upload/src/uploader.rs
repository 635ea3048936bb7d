use std::sync::Arc;

use chrono::{DateTime, Utc};
use picrelay_types::{sanitize_file_name, ObjectName, RepositoryId};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::{ContentApi, ContentWrite, WriteOutcome};
use crate::error::{UploadError, UploadResult};

pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Where and how the uploader places objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploaderSettings {
    /// Account owning every backing repository.
    pub owner: String,
    pub branch: String,
    /// Directory inside each repository; empty means the repository root.
    pub upload_dir: String,
    /// Prefix of public addresses: `{raw_base}/{owner}/{repo}/{branch}/{path}`.
    pub raw_base: String,
    /// Add a random segment to stored names so same-second uploads of one
    /// file name do not collide.
    pub unique_names: bool,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            branch: "main".into(),
            upload_dir: "uploads".into(),
            raw_base: DEFAULT_RAW_BASE.into(),
            unique_names: true,
        }
    }
}

/// Result of a committed upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub name: ObjectName,
    /// Path inside the repository.
    pub path: String,
    pub public_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Pushes raw bytes into one backing repository per call.
///
/// Makes exactly one remote write attempt and never retries.
pub struct ObjectUploader {
    api: Arc<dyn ContentApi>,
    settings: UploaderSettings,
    raw_base: Url,
}

impl ObjectUploader {
    pub fn new(api: Arc<dyn ContentApi>, settings: UploaderSettings) -> UploadResult<Self> {
        if settings.owner.trim().is_empty() {
            return Err(UploadError::Config("repository owner is not set".into()));
        }
        if settings.branch.trim().is_empty() {
            return Err(UploadError::Config("branch is not set".into()));
        }
        let raw_base = Url::parse(&settings.raw_base)
            .map_err(|e| UploadError::Config(format!("raw base {:?}: {e}", settings.raw_base)))?;
        if raw_base.cannot_be_a_base() {
            return Err(UploadError::Config(format!("raw base {:?} cannot hold a path", settings.raw_base)));
        }
        Ok(Self {
            api,
            settings,
            raw_base,
        })
    }

    pub fn settings(&self) -> &UploaderSettings {
        &self.settings
    }

    pub fn api(&self) -> &Arc<dyn ContentApi> {
        &self.api
    }

    /// Commit `content` to `repository` under a timestamp-prefixed name
    /// derived from `original_name`, and return its public address.
    pub async fn put_object(
        &self,
        repository: &RepositoryId,
        original_name: &str,
        content: &[u8],
    ) -> UploadResult<StoredObject> {
        let original = sanitize_file_name(original_name)?;
        let now = Utc::now();
        let nonce = self.settings.unique_names.then(rand::random::<u32>);
        let name = ObjectName::derive(&original, now, nonce)?;
        let path = self.object_path(&name);
        let message = format!("Upload {original} at {}", name.timestamp_prefix());

        let write = ContentWrite {
            owner: &self.settings.owner,
            repository,
            path: &path,
            branch: &self.settings.branch,
            message: &message,
            content,
        };

        match self.api.create_or_update(&write).await? {
            WriteOutcome::Committed => {
                let public_url = self.public_url(repository, &path)?;
                tracing::info!(%repository, %path, bytes = content.len(), "object committed");
                Ok(StoredObject {
                    name,
                    path,
                    public_url,
                    uploaded_at: now,
                })
            }
            WriteOutcome::Conflict { status, body } | WriteOutcome::Rejected { status, body } => {
                tracing::warn!(%repository, %path, status, %body, "remote refused write");
                Err(UploadError::Rejected { status, body })
            }
        }
    }

    /// `{upload_dir}/{name}`, or just `{name}` when `upload_dir` is empty.
    pub fn object_path(&self, name: &ObjectName) -> String {
        let dir = self.settings.upload_dir.trim_matches('/');
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        }
    }

    /// Public address of `path` in `repository`:
    /// `{raw_base}/{owner}/{repository}/{branch}/{path}`, percent-encoded.
    pub fn public_url(&self, repository: &RepositoryId, path: &str) -> UploadResult<String> {
        let mut url = self.raw_base.clone();
        url.path_segments_mut()
            .map_err(|_| UploadError::Config("raw base cannot hold a path".into()))?
            .pop_if_empty()
            .extend([self.settings.owner.as_str(), repository.as_str()])
            .extend(self.settings.branch.split('/'))
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url.into())
    }
}

impl std::fmt::Debug for ObjectUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUploader")
            .field("api", &self.api.name())
            .field("settings", &self.settings)
            .finish()
    }
}
