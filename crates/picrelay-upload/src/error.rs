use picrelay_types::TypeError;

/// Errors from pushing an object to a backing repository.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The remote API could not be reached or answered with something that
    /// is not a content API response (timeout, refused connection, garbage).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote API answered and refused the write. `body` is the remote's
    /// diagnostic payload, unmodified.
    #[error("remote rejected write (HTTP {status}): {body}")]
    Rejected { status: u16, body: serde_json::Value },

    /// The client-supplied name cannot be turned into a stored name.
    #[error("invalid object name: {0}")]
    InvalidName(#[from] TypeError),

    /// The uploader or API client is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
