//! HTTP server for picrelay.
//!
//! Serves a small upload page and a multipart upload endpoint that relays
//! each image to the next backing repository, plus health and info
//! endpoints for operators.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{GitHubConfig, ServerConfig, MEMORY_CONTENT_BACKEND};
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, IMAGE_FIELD};
pub use server::{build_orchestrator, content_api, open_store, PicrelayServer};
