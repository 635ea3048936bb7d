use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository identifier {0:?}")]
    InvalidRepository(String),

    #[error("repository list is empty")]
    EmptyRepositoryList,

    #[error("repository listed twice: {0}")]
    DuplicateRepository(String),

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("invalid stored object name {0:?}")]
    InvalidObjectName(String),
}
