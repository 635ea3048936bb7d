//! Metadata store for picrelay.
//!
//! Owns the two pieces of persistent state the upload pipeline relies on:
//!
//! - the **rotation counter**, a singleton row advanced atomically once per
//!   upload to pick the next backing repository;
//! - the **upload log**, an append-only audit trail of successful uploads.
//!
//! # Storage Backends
//!
//! All backends implement the [`MetadataStore`] trait:
//!
//! - [`InMemoryMetadataStore`]: mutex-guarded state for tests and embedding
//! - [`SqliteMetadataStore`]: single-host deployments
//! - [`PgMetadataStore`]: production, safe to share between processes
//!
//! [`connect`] picks one from a database URL.
//!
//! # Design Rules
//!
//! 1. The counter is only ever changed by one atomic read-modify-write.
//! 2. Records are appended, never updated; only an explicit `reset` deletes.
//! 3. Schema creation is idempotent and safe to race.
//! 4. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod traits;

mod sql;

#[cfg(test)]
mod conformance;

use std::sync::Arc;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryMetadataStore;
pub use postgres::{PgMetadataStore, PgOptions};
pub use sqlite::SqliteMetadataStore;
pub use traits::{rotate, MetadataStore};

/// Open the backend named by `url`'s scheme.
///
/// - `postgres://…`, `postgresql://…` → [`PgMetadataStore`]
/// - `sqlite:…` → [`SqliteMetadataStore`]
/// - `memory:` → [`InMemoryMetadataStore`]
pub async fn connect(url: &str) -> StoreResult<Arc<dyn MetadataStore>> {
    let store: Arc<dyn MetadataStore> = if url.starts_with("postgres://")
        || url.starts_with("postgresql://")
    {
        Arc::new(PgMetadataStore::connect(url).await?)
    } else if url.starts_with("sqlite:") {
        Arc::new(SqliteMetadataStore::connect(url).await?)
    } else if url == "memory:" {
        Arc::new(InMemoryMetadataStore::new())
    } else {
        return Err(StoreError::UnsupportedUrl(redact(url)));
    };
    tracing::info!(backend = store.backend(), "metadata store connected");
    Ok(store)
}

/// Strip credentials from a URL before it reaches an error or a log line.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
