//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create an account, returns a token
//! - POST /api/auth/login - Sign in, returns a token
//! - GET /api/auth/me - Current account
//! - GET /api/auth/users/{username} - Active account by username
//! - GET /api/auth/check-username/{username}
//! - GET /api/auth/check-email/{email}
//!
//! Both checks look up by email when the value contains `@`.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::{AuthResponse, LoginInput, RegisterInput, UserResponse};

/// Routes that need a bearer token
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/users/{username}", get(get_user_by_username))
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/check-username/{username}", get(check_username))
        .route("/check-email/{email}", get(check_email))
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(state.auth_service.register(input).await?))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(state.auth_service.login(input).await?))
}

async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    state
        .auth_service
        .get_by_id(user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    state
        .auth_service
        .get_by_username(username.trim())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", username)))
}

async fn check_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state.auth_service.exists(&username).await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn check_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state.auth_service.exists(&email).await?;
    Ok(Json(ExistsResponse { exists }))
}
