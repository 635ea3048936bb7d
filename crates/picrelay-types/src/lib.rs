//! Foundation types for picrelay.
//!
//! picrelay accepts uploaded images and spreads them across a fixed set of
//! backing content repositories in strict round-robin order, recording every
//! successful upload in an append-only audit log. This crate holds the
//! vocabulary shared by every other picrelay crate.
//!
//! # Key Types
//!
//! - [`RepositoryId`]: Validated identifier of one backing repository
//! - [`RepositoryList`]: Ordered, non-empty, immutable rotation targets
//! - [`ObjectName`]: Timestamp-prefixed name an upload is stored under
//! - [`UploadRecord`]: One row of the audit log
//! - [`NewUploadRecord`]: An audit row before the store assigns its id

pub mod error;
pub mod object;
pub mod record;
pub mod repository;

pub use error::TypeError;
pub use object::{sanitize_file_name, ObjectName, TIMESTAMP_FORMAT, TIMESTAMP_LEN};
pub use record::{NewUploadRecord, UploadRecord};
pub use repository::{RepositoryId, RepositoryList};
