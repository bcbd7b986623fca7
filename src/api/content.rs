//! Content API endpoints
//!
//! Pages with their tags, icon uploads, and the packs attached to a page.
//! Icons and page files are stored through the file service, so every
//! id a page holds names a `files` row.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::common::{check_icon_type, FormData, UploadedPart};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{parse_tag_list, IconKind, NewFile, Pack, PackInput, Page, PageFilter, PageInput};
use crate::services::FileServiceError;

/// Page as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub quad_icon: Option<Uuid>,
    pub wide_icon: Option<Uuid>,
    pub file: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageResponse {
    pub fn from_page(page: &Page) -> Self {
        Self {
            id: page.id,
            name: page.name.clone(),
            description: page.description.clone(),
            content: page.content.clone(),
            quad_icon: page.quad_icon,
            wide_icon: page.wide_icon,
            file: page.file,
            tags: page.tags.iter().map(|t| t.tag_name.clone()).collect(),
            created_at: page.created_at,
            updated_at: page.updated_at,
        }
    }
}

fn page_list(pages: &[Page]) -> Json<Vec<PageResponse>> {
    Json(pages.iter().map(PageResponse::from_page).collect())
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/pages", get(list_pages))
        .route("/all", get(list_all_pages))
        .route("/pages/{id}", get(get_page))
        .route("/pages/{id}/packs", get(list_packs))
        .route("/tags", get(list_tags))
}

/// Routes that need a bearer token
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/pages", post(create_page))
        .route("/pages/with-icons", post(create_page_with_icons))
        .route("/pages/{id}", put(update_page))
        .route("/pages/{id}", delete(delete_page))
        .route("/pages/{id}/with-icons", put(update_page_with_icons))
        .route("/pages/{id}/upload-icons", post(upload_icons))
        .route("/pages/{id}/icons/{icon_type}", delete(delete_icon))
        .route("/pages/{id}/packs", post(create_pack))
        .route("/packs/{id}", delete(delete_pack))
}

// ============================================================================
// Queries
// ============================================================================

async fn list_pages(
    State(state): State<AppState>,
    Query(filter): Query<PageFilter>,
) -> Result<Json<Vec<PageResponse>>, ApiError> {
    let pages = state.content_service.list(Some(&filter)).await?;
    Ok(page_list(&pages))
}

async fn list_all_pages(State(state): State<AppState>) -> Result<Json<Vec<PageResponse>>, ApiError> {
    let pages = state.content_service.list(None).await?;
    Ok(page_list(&pages))
}

async fn get_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PageResponse>, ApiError> {
    let page = state.content_service.get_by_id(id).await?;
    Ok(Json(PageResponse::from_page(&page)))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.content_service.distinct_tags().await?))
}

// ============================================================================
// JSON mutations
// ============================================================================

async fn create_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<PageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.content_service.create(Page::from_input(input)).await?;
    tracing::debug!(page_id = %page.id, user_id = %user.id, "Page created via API");
    Ok((StatusCode::CREATED, Json(PageResponse::from_page(&page))))
}

async fn update_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<PageInput>,
) -> Result<Json<PageResponse>, ApiError> {
    let page = state.content_service.update(id, input).await?;
    Ok(Json(PageResponse::from_page(&page)))
}

/// Delete the page's icons and file, then the page itself
async fn delete_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let page = state.content_service.get_by_id(id).await?;
    for file_id in page.attachments() {
        delete_attachment(&state, file_id).await?;
    }
    state.content_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Multipart mutations
// ============================================================================

/// Text fields of a page form; `tags` is comma separated
fn page_input_from_form(form: &FormData) -> PageInput {
    PageInput {
        name: form.text("name").unwrap_or_default().trim().to_string(),
        description: form.non_blank("description"),
        content: form.non_blank("content"),
        tags: form.text("tags").map(parse_tag_list).unwrap_or_default(),
        ..Default::default()
    }
}

async fn create_page_with_icons(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let mut input = page_input_from_form(&form);
    let mut uploaded = Vec::new();

    let result = async {
        if let Some(part) = form.take_file("quad_icon") {
            input.quad_icon = Some(store_upload(&state, part, user.id, true).await?);
            uploaded.extend(input.quad_icon);
        }
        if let Some(part) = form.take_file("wide_icon") {
            input.wide_icon = Some(store_upload(&state, part, user.id, true).await?);
            uploaded.extend(input.wide_icon);
        }
        if let Some(part) = form.take_file("file") {
            input.file = Some(store_upload(&state, part, user.id, false).await?);
            uploaded.extend(input.file);
        }
        Ok::<_, ApiError>(state.content_service.create(Page::from_input(input)).await?)
    }
    .await;

    match result {
        Ok(page) => Ok((StatusCode::CREATED, Json(PageResponse::from_page(&page)))),
        Err(e) => {
            discard_uploads(&state, &uploaded).await;
            Err(e)
        }
    }
}

/// Replace the text fields and tag set. Icons change only when the
/// matching `replace_*` flag is set; a flag without a new file clears
/// the icon. A new `file` part replaces the page file.
async fn update_page_with_icons(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<PageResponse>, ApiError> {
    let existing = state.content_service.get_by_id(id).await?;
    let mut form = FormData::read(multipart).await?;

    let mut input = page_input_from_form(&form);
    input.quad_icon = existing.quad_icon;
    input.wide_icon = existing.wide_icon;
    input.file = existing.file;

    let mut uploaded = Vec::new();
    let mut replaced = Vec::new();

    let result = async {
        for (kind, flag, field) in [
            (IconKind::Quad, "replace_quad_icon", "quad_icon"),
            (IconKind::Wide, "replace_wide_icon", "wide_icon"),
        ] {
            if !form.flag(flag) {
                continue;
            }
            let new_id = match form.take_file(field) {
                Some(part) => Some(store_upload(&state, part, user.id, true).await?),
                None => None,
            };
            uploaded.extend(new_id);
            replaced.extend(kind.get(&existing));
            match kind {
                IconKind::Quad => input.quad_icon = new_id,
                IconKind::Wide => input.wide_icon = new_id,
            }
        }

        if let Some(part) = form.take_file("file") {
            let new_id = store_upload(&state, part, user.id, false).await?;
            uploaded.push(new_id);
            replaced.extend(existing.file);
            input.file = Some(new_id);
        }

        Ok::<_, ApiError>(state.content_service.update(id, input).await?)
    }
    .await;

    match result {
        Ok(page) => {
            discard_uploads(&state, &replaced).await;
            Ok(Json(PageResponse::from_page(&page)))
        }
        Err(e) => {
            discard_uploads(&state, &uploaded).await;
            Err(e)
        }
    }
}

/// Upload one or both icons, replacing whatever the page held
async fn upload_icons(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<PageResponse>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    if !form.has_file("quad_icon") && !form.has_file("wide_icon") {
        return Err(ApiError::validation_error("No files provided for upload"));
    }

    let mut page = state.content_service.get_by_id(id).await?;
    for (kind, field) in [(IconKind::Quad, "quad_icon"), (IconKind::Wide, "wide_icon")] {
        let Some(part) = form.take_file(field) else {
            continue;
        };
        let file_id = store_upload(&state, part, user.id, true).await?;
        let (updated, previous) = match state.content_service.set_icon(id, kind, Some(file_id)).await {
            Ok(result) => result,
            Err(e) => {
                discard_uploads(&state, &[file_id]).await;
                return Err(e.into());
            }
        };
        discard_uploads(&state, previous.as_slice()).await;
        page = updated;
    }

    Ok(Json(PageResponse::from_page(&page)))
}

async fn delete_icon(
    State(state): State<AppState>,
    Path((id, icon_type)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let kind: IconKind = icon_type
        .parse()
        .map_err(|_| ApiError::validation_error("Invalid icon type. Use 'quad' or 'wide'."))?;

    let page = state.content_service.get_by_id(id).await?;
    if kind.get(&page).is_some() {
        let (_, previous) = state.content_service.set_icon(id, kind, None).await?;
        if let Some(file_id) = previous {
            delete_attachment(&state, file_id).await?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Packs
// ============================================================================

async fn list_packs(
    State(state): State<AppState>,
    Path(page_id): Path<Uuid>,
) -> Result<Json<Vec<Pack>>, ApiError> {
    if !state.content_service.exists(page_id).await? {
        return Err(ApiError::not_found(format!("Page not found: {}", page_id)));
    }
    Ok(Json(state.catalog_service.list_packs(page_id).await?))
}

async fn create_pack(
    State(state): State<AppState>,
    Path(page_id): Path<Uuid>,
    Json(input): Json<PackInput>,
) -> Result<impl IntoResponse, ApiError> {
    let pack = state.catalog_service.create_pack(page_id, input).await?;
    Ok((StatusCode::CREATED, Json(pack)))
}

async fn delete_pack(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog_service.delete_pack(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Helpers
// ============================================================================

/// Store an uploaded part as a managed file owned by `owner`
async fn store_upload(
    state: &AppState,
    part: UploadedPart,
    owner: Uuid,
    icon: bool,
) -> Result<Uuid, ApiError> {
    if icon {
        check_icon_type(&part, &state.upload_config)?;
    }

    let stub = NewFile::new(part.content_type, Some(owner));
    let stored = state.file_service.create(stub, &part.data[..]).await?;
    Ok(stored.record.id)
}

/// Delete a managed file; one that is already gone counts as deleted
async fn delete_attachment(state: &AppState, file_id: Uuid) -> Result<(), ApiError> {
    match state.file_service.delete(file_id).await {
        Ok(()) | Err(FileServiceError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of files no page refers to any more
async fn discard_uploads(state: &AppState, file_ids: &[Uuid]) {
    for file_id in file_ids {
        if let Err(e) = delete_attachment(state, *file_id).await {
            tracing::warn!(file_id = %file_id, error = ?e, "Failed to remove unreferenced file");
        }
    }
}
