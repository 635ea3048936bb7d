use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] picrelay_store::StoreError),

    #[error("upload client error: {0}")]
    Upload(#[from] picrelay_upload::UploadError),

    #[error(transparent)]
    Relay(#[from] picrelay_core::RelayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
