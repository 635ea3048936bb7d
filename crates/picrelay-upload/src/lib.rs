//! Object uploader for picrelay.
//!
//! Commits one uploaded image into one backing repository and derives the
//! public address it can be fetched from afterwards. The remote side is
//! reached through the [`ContentApi`] capability:
//!
//! - [`GitHubContentApi`]: the GitHub REST contents API over `reqwest`
//! - [`InMemoryContentApi`]: in-process stand-in for tests and offline runs
//!
//! [`ObjectUploader`] owns the naming and addressing conventions and makes a
//! single write attempt per call; retry policy, if any, belongs to callers.

pub mod api;
pub mod error;
pub mod github;
pub mod memory;
pub mod uploader;

pub use api::{ContentApi, ContentWrite, DirectoryListing, WriteOutcome};
pub use error::{UploadError, UploadResult};
pub use github::{GitHubClientConfig, GitHubContentApi, DEFAULT_API_BASE};
pub use memory::{AttemptedWrite, InMemoryContentApi, InjectedFailure, ObjectKey};
pub use uploader::{ObjectUploader, StoredObject, UploaderSettings, DEFAULT_RAW_BASE};
