use std::fmt;

use picrelay_store::StoreError;
use picrelay_upload::UploadError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure of one pass through the upload pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or malformed request data. Raised before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The metadata store could not ensure its schema or claim a slot.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// The object was committed remotely but its audit record was not
    /// written. The object at `public_url` exists without a log entry.
    #[error("storage unavailable: {source} (object already stored at {public_url} is unrecorded)")]
    RecordFailed {
        public_url: String,
        #[source]
        source: StoreError,
    },

    /// The content API could not be reached or answered nonsense.
    #[error("upload transport error: {0}")]
    UploadTransport(String),

    /// The content API refused the write; `body` is its payload verbatim.
    #[error("upload rejected (HTTP {status}): {body}")]
    UploadRejected { status: u16, body: Value },
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StorageUnavailable(_) | Self::RecordFailed { .. } => ErrorKind::StorageUnavailable,
            Self::UploadTransport(_) => ErrorKind::UploadTransportError,
            Self::UploadRejected { .. } => ErrorKind::UploadRejected,
        }
    }
}

impl From<UploadError> for RelayError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Transport(reason) => Self::UploadTransport(reason),
            UploadError::Rejected { status, body } => Self::UploadRejected { status, body },
            UploadError::InvalidName(e) => Self::InvalidInput(e.to_string()),
            // Settings are validated when the uploader is built, so this only
            // means a request could not be formed at all.
            UploadError::Config(reason) => Self::UploadTransport(reason),
        }
    }
}

/// The four failure classes callers distinguish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    StorageUnavailable,
    UploadTransportError,
    UploadRejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::StorageUnavailable => "StorageUnavailable",
            Self::UploadTransportError => "UploadTransportError",
            Self::UploadRejected => "UploadRejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
