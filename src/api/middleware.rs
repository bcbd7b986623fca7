//! API middleware
//!
//! Shared application state, the JSON error envelope, and bearer-token
//! authentication.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, UploadConfig};
use crate::db::repositories::{
    SqlxAddonPageRepository, SqlxFileRepository, SqlxPackRepository, SqlxPageRepository,
    SqlxTeamRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    AuthService, AuthServiceError, CatalogService, CatalogServiceError, ContentService,
    ContentServiceError, FileServiceError, FileStorageService, TokenService,
};
use crate::storage::{DynObjectStore, StorageError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub store: DynObjectStore,
    pub tokens: Arc<TokenService>,
    pub auth_service: Arc<AuthService>,
    pub content_service: Arc<ContentService>,
    pub file_service: Arc<FileStorageService>,
    pub catalog_service: Arc<CatalogService>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire every service over one pool and one object store
    pub fn new(pool: DynDatabasePool, store: DynObjectStore, config: &Config) -> Self {
        let tokens = Arc::new(TokenService::new(&config.auth));
        let users = SqlxUserRepository::boxed(pool.clone());
        let pages = SqlxPageRepository::boxed(pool.clone());

        let auth_service = AuthService::new(users.clone(), tokens.clone());
        let content_service = ContentService::new(pages.clone());
        let file_service = FileStorageService::new(SqlxFileRepository::boxed(pool.clone()), store.clone())
            .with_max_size(config.upload.max_file_size);
        let catalog_service = CatalogService::new(
            pages,
            SqlxPackRepository::boxed(pool.clone()),
            SqlxTeamRepository::boxed(pool.clone()),
            SqlxAddonPageRepository::boxed(pool.clone()),
            users,
        );

        Self {
            pool,
            store,
            tokens,
            auth_service: Arc::new(auth_service),
            content_service: Arc::new(content_service),
            file_service: Arc::new(file_service),
            catalog_service: Arc::new(catalog_service),
            upload_config: Arc::new(config.upload.clone()),
        }
    }
}

/// Identity taken from a validated access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Same as `new`, with structured context for the client
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new("STORAGE_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(err: &anyhow::Error) -> Self {
        tracing::error!(error = ?err, "Request failed");
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "STORAGE_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::not_found(format!("Object not found: {}", key)),
            other => {
                tracing::warn!(error = %other, "Object store request failed");
                Self::storage_error(other.to_string())
            }
        }
    }
}

impl From<FileServiceError> for ApiError {
    fn from(err: FileServiceError) -> Self {
        match err {
            FileServiceError::NotFound(id) => Self::not_found(format!("File not found: {}", id)),
            FileServiceError::Validation(msg) => Self::validation_error(msg),
            FileServiceError::Storage(e) => e.into(),
            FileServiceError::Internal(e) => Self::internal(&e),
        }
    }
}

impl From<ContentServiceError> for ApiError {
    fn from(err: ContentServiceError) -> Self {
        match err {
            ContentServiceError::NotFound(id) => Self::not_found(format!("Page not found: {}", id)),
            ContentServiceError::Validation(msg) => Self::validation_error(msg),
            ContentServiceError::Internal(e) => Self::internal(&e),
        }
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::Validation(msg) => Self::validation_error(msg),
            AuthServiceError::Conflict(msg) => Self::conflict(msg),
            AuthServiceError::Unauthorized(msg) => Self::unauthorized(msg),
            AuthServiceError::Internal(e) => Self::internal(&e),
        }
    }
}

impl From<CatalogServiceError> for ApiError {
    fn from(err: CatalogServiceError) -> Self {
        match err {
            CatalogServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            CatalogServiceError::Validation(msg) => Self::validation_error(msg),
            CatalogServiceError::Internal(e) => Self::internal(&e),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let claims = state.tokens.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::unauthorized("Invalid or expired token")
    })?;
    let id = claims
        .user_id()
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    request.extensions_mut().insert(AuthenticatedUser {
        id,
        username: claims.name,
        email: claims.email,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_header(value: &str) -> Request {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = request_with_header("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&request), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&request).is_none());
        assert!(extract_bearer_token(&request_with_header("Basic abc")).is_none());
        assert!(extract_bearer_token(&request_with_header("Bearer ")).is_none());
    }

    #[test]
    fn test_error_codes_map_to_status() {
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::storage_error("x").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_storage_errors_map() {
        let missing: ApiError = StorageError::NotFound("images/x".into()).into();
        assert_eq!(missing.error.code, "NOT_FOUND");

        let upstream: ApiError = StorageError::upstream("503 Slow Down").into();
        assert_eq!(upstream.error.code, "STORAGE_ERROR");
    }

    #[test]
    fn test_internal_errors_hide_cause() {
        let err: ApiError = ContentServiceError::Internal(anyhow::anyhow!("db password leaked")).into();
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains("password"));
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ApiError::conflict("taken")).unwrap();
        assert_eq!(json["error"]["code"], "CONFLICT");
        assert_eq!(json["error"]["message"], "taken");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_error_with_details() {
        let details = serde_json::json!({ "field": "name" });
        let err = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["details"], details);
    }
}
