//! Managed file endpoints
//!
//! - POST /api/file - Upload (multipart `file`)
//! - GET /api/file/{id} - Payload with its content type
//! - GET /api/file/{id}/meta - Metadata
//! - PUT /api/file/{id} - Replace payload (multipart `file`)
//! - DELETE /api/file/{id}

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::common::{FormData, UploadedPart};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{FileRecord, NewFile, DEFAULT_CONTENT_TYPE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub id: Uuid,
    pub content_type: String,
    pub size: i64,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FileResponse {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            content_type: record.content_type_or_default().to_string(),
            size: record.size,
            user_id: record.user_id,
            created_at: record.created_at,
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_file))
        .route("/{id}/meta", get(get_file_meta))
}

/// Routes that need a bearer token
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_file))
        .route("/{id}", axum::routing::put(replace_file).delete(delete_file))
}

/// Binary response carrying the stored content type
pub(crate) fn binary_response(content_type: Option<&str>, data: Bytes) -> Response {
    let content_type = content_type
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    ([(header::CONTENT_TYPE, content_type)], data).into_response()
}

/// The `file` part of a form, also accepted as `data`
fn take_upload(form: &mut FormData) -> Result<UploadedPart, ApiError> {
    form.take_file("file")
        .or_else(|| form.take_file("data"))
        .ok_or_else(|| ApiError::validation_error("No file provided"))
}

async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let part = take_upload(&mut form)?;

    let stub = NewFile::new(part.content_type, Some(user.id));
    let stored = state.file_service.create(stub, &part.data[..]).await?;
    Ok((StatusCode::CREATED, Json(FileResponse::from_record(&stored.record))))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let stored = state.file_service.get(id).await?;
    Ok(binary_response(stored.record.content_type.as_deref(), stored.data))
}

async fn get_file_meta(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileResponse>, ApiError> {
    let record = state.file_service.get_record(id).await?;
    Ok(Json(FileResponse::from_record(&record)))
}

async fn replace_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<FileResponse>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let part = take_upload(&mut form)?;

    let stub = NewFile::new(part.content_type, Some(user.id));
    let stored = state.file_service.update(id, stub, &part.data[..]).await?;
    Ok(Json(FileResponse::from_record(&stored.record)))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.file_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
