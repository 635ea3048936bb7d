use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use picrelay_core::{ErrorKind, RelayError, UploadOrchestrator};
use serde::Serialize;
use serde_json::{json, Value};

/// Multipart field carrying the file.
pub const IMAGE_FIELD: &str = "image";

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<UploadOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug)]
pub enum ApiError {
    NoImage,
    Multipart(MultipartError),
    Relay(RelayError),
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NoImage => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "No image file sent"}))).into_response()
            }
            Self::Multipart(e) => {
                (e.status(), Json(json!({"error": e.body_text()}))).into_response()
            }
            Self::Relay(e) => {
                let kind = e.kind();
                let status = match kind {
                    ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let mut body = json!({"error": e.to_string(), "kind": kind});
                if let RelayError::UploadRejected { body: detail, .. } = e {
                    body["detail"] = detail;
                }
                (status, Json(body)).into_response()
            }
        }
    }
}

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Accept one file in the `image` field and relay it to the next backing
/// repository.
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::NoImage);
    };

    while let Some(field) = multipart.next_field().await.map_err(ApiError::Multipart)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(ApiError::Multipart)?;
        tracing::debug!(file_name = %file_name, bytes = bytes.len(), "image received");

        let receipt = state.orchestrator.handle_upload(&file_name, &bytes).await?;
        return Ok(Json(UploadResponse {
            url: receipt.public_url,
        }));
    }
    Err(ApiError::NoImage)
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    let settings = orchestrator.uploader().settings();
    Json(json!({
        "name": "picrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "repositories": orchestrator.allocator().repositories().len(),
        "owner": settings.owner,
        "branch": settings.branch,
        "store": orchestrator.store().backend(),
        "content_api": orchestrator.uploader().api().name(),
    }))
}
