//! Upload pipeline for picrelay.
//!
//! Ties the metadata store and the object uploader together:
//!
//! - [`RepositoryAllocator`] picks the backing repository for each upload
//!   by strict round-robin over a counter persisted in the store.
//! - [`UploadOrchestrator`] runs ensure-schema, allocate, upload, record for
//!   each request and returns the public address.
//! - [`reconcile`] compares the audit log with repository contents offline.
//!
//! Every failure surfaces as a [`RelayError`] whose [`ErrorKind`] the HTTP
//! layer maps to a status code.

pub mod allocator;
pub mod error;
pub mod orchestrator;
pub mod reconcile;

pub use allocator::{Allocation, RepositoryAllocator};
pub use error::{ErrorKind, RelayError, RelayResult};
pub use orchestrator::{UploadOrchestrator, UploadReceipt};
pub use reconcile::{reconcile, ReconcileReport, RepositoryReport};
