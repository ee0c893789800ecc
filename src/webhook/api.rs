use std::io::Write;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::NamedTempFile;

use super::server::AppState;
use crate::models::{MenuSuggestion, ProductRecord};
use crate::services::StorageError;

/// Endpoint-boundary error. Everything downstream is converted to one of these
/// with a human-readable detail message (FastAPI-style `{"detail": ...}` body).
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(detail) => {
                log::error!("❌ Request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// `POST /analyze` — multipart photo upload, returns the extracted record.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ProductRecord>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            // rejected before any storage or model call
            return Err(ApiError::BadRequest(format!(
                "file must be an image, got {}",
                content_type
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

        let record = state
            .analyzer
            .analyze(&content_type, &data)
            .await
            .map_err(ApiError::internal)?;
        return Ok(Json(record));
    }

    Err(ApiError::BadRequest("missing file field".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct SuggestMenuRequest {
    pub products: Vec<ProductRecord>,
}

/// `POST /suggest-menu` — dish suggestion from the soonest-expiring products.
pub async fn suggest_menu(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SuggestMenuRequest>,
) -> Result<Json<MenuSuggestion>, ApiError> {
    if request.products.is_empty() {
        return Err(ApiError::BadRequest("products must not be empty".to_string()));
    }

    let suggestion = state
        .planner
        .suggest(&request.products)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(suggestion))
}

#[derive(Debug, Deserialize)]
pub struct UploadJsonRequest {
    pub id: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct UploadJsonResponse {
    pub url: String,
}

/// `POST /upload-json` — store an arbitrary JSON document under `{id}.json`.
/// Re-uploading the same id overwrites the previous document wholesale.
pub async fn upload_json(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadJsonRequest>,
) -> Result<Json<UploadJsonResponse>, ApiError> {
    // Staging copy on disk, removed when dropped
    let mut temp = NamedTempFile::new().map_err(ApiError::internal)?;
    serde_json::to_writer(&mut temp, &request.data).map_err(ApiError::internal)?;
    temp.flush().map_err(ApiError::internal)?;

    let data = std::fs::read(temp.path()).map_err(ApiError::internal)?;
    let url = state
        .storage
        .put_object(&format!("{}.json", request.id), data)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(UploadJsonResponse { url }))
}

/// `GET /get-json/{id}` — fetch a stored document; 404 when the key is absent.
pub async fn get_json(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let data = state
        .storage
        .get_object(&format!("{}.json", id))
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::NotFound(format!("document not found: {}", id)),
            other => ApiError::internal(other),
        })?;

    let mut temp = NamedTempFile::new().map_err(ApiError::internal)?;
    temp.write_all(&data).map_err(ApiError::internal)?;

    let file = temp.reopen().map_err(ApiError::internal)?;
    let value = serde_json::from_reader(file).map_err(ApiError::internal)?;
    Ok(Json(value))
}
