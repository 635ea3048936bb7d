use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::RepositoryId;

/// An audit-log entry as handed to the metadata store, before it has an id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUploadRecord {
    pub object_name: String,
    pub public_url: String,
    pub repository: RepositoryId,
    pub uploaded_at: DateTime<Utc>,
}

/// One row of the append-only audit log.
///
/// Written exactly once per successful upload and never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Store-assigned sequence number, increasing in append order.
    pub id: i64,
    pub object_name: String,
    pub public_url: String,
    pub repository: RepositoryId,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn from_new(id: i64, record: NewUploadRecord) -> Self {
        Self {
            id,
            object_name: record.object_name,
            public_url: record.public_url,
            repository: record.repository,
            uploaded_at: record.uploaded_at,
        }
    }
}
