//! Team and addon page endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AddonPage, AddonPageInput, AddonStatus, MemberPosition, TeamInput, TeamWithMembers};

pub fn teams_public_router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_team))
}

pub fn teams_protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_team))
        .route("/{id}/members", post(add_member))
        .route("/{id}/members/{maker_id}", delete(remove_member))
}

pub fn addons_public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addons))
        .route("/{id}", get(get_addon))
}

pub fn addons_protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_addon))
        .route("/{id}", delete(delete_addon))
        .route("/{id}/status", put(set_addon_status))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub position: MemberPosition,
}

#[derive(Debug, Deserialize)]
pub struct AddonListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AddonStatus,
}

// ============================================================================
// Teams
// ============================================================================

/// The creator joins the new team as its owner
async fn create_team(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<TeamInput>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state.catalog_service.create_team(input).await?;
    state
        .catalog_service
        .add_member(team.id, user.id, MemberPosition::Owner)
        .await?;
    let team = state.catalog_service.get_team(team.id).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

async fn get_team(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamWithMembers>, ApiError> {
    Ok(Json(state.catalog_service.get_team(id).await?))
}

async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .catalog_service
        .add_member(id, request.user_id, request.position)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_member(
    State(state): State<AppState>,
    Path((id, maker_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.catalog_service.remove_member(id, maker_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Addon pages
// ============================================================================

async fn list_addons(
    State(state): State<AppState>,
    Query(query): Query<AddonListQuery>,
) -> Result<Json<Vec<AddonPage>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<AddonStatus>()
                .map_err(|e| ApiError::validation_error(e.to_string()))?,
        ),
        None => None,
    };
    Ok(Json(state.catalog_service.list_addon_pages(status).await?))
}

async fn get_addon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AddonPage>, ApiError> {
    Ok(Json(state.catalog_service.get_addon_page(id).await?))
}

async fn create_addon(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<AddonPageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.catalog_service.create_addon_page(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn set_addon_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<AddonPage>, ApiError> {
    Ok(Json(state.catalog_service.set_addon_status(id, request.status).await?))
}

async fn delete_addon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog_service.delete_addon_page(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
