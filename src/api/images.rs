//! Raw image passthrough
//!
//! Objects live under `images/{id}` with no metadata row; the caller
//! chooses the id.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::common::{check_icon_type, FormData};
use crate::api::files::binary_response;
use crate::api::middleware::{ApiError, AppState};
use crate::storage::image_key;

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/image/{id}", get(get_image))
}

/// Routes that need a bearer token
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/image/{id}", post(upload_image).delete(delete_image))
}

/// Multipart field `data` (or `file`) holds the image
async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let part = form
        .take_file("data")
        .or_else(|| form.take_file("file"))
        .ok_or_else(|| ApiError::validation_error("No image provided"))?;

    check_icon_type(&part, &state.upload_config)?;
    let content_type = part.content_type.unwrap_or_default();
    if part.data.len() as u64 > state.upload_config.max_file_size {
        return Err(ApiError::validation_error(format!(
            "File too large. Maximum size: {} bytes",
            state.upload_config.max_file_size
        )));
    }

    let key = image_key(id);
    let size = part.data.len();
    state.store.put(&key, part.data, &content_type).await?;
    tracing::info!(key = %key, size, "Image stored");

    Ok((
        StatusCode::CREATED,
        Json(ImageResponse {
            id,
            key,
            content_type,
            size,
        }),
    ))
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let object = state.store.get(&image_key(id)).await?;
    Ok(binary_response(object.content_type.as_deref(), object.data))
}

async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&image_key(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
