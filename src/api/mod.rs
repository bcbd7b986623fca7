//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api`:
//! - `/api/auth` - registration, sign-in, account lookups
//! - `/api/content` - pages, tags, icons and packs
//! - `/api/file` - managed files
//! - `/api/s3` - raw image passthrough
//! - `/api/teams`, `/api/addons` - teams and addon pages
//!
//! Mutating routes sit behind `require_auth`.

pub mod auth;
pub mod catalog;
pub mod common;
pub mod content;
pub mod files;
pub mod images;
pub mod middleware;


use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Room for multipart framing and text fields around the largest file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid bearer token)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/content", content::protected_router())
        .nest("/file", files::protected_router())
        .nest("/s3", images::protected_router())
        .nest("/teams", catalog::teams_protected_router())
        .nest("/addons", catalog::addons_protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/content", content::public_router())
        .nest("/file", files::public_router())
        .nest("/s3", images::public_router())
        .nest("/teams", catalog::teams_public_router())
        .nest("/addons", catalog::addons_public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = if cors_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let value = cors_origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
        AllowOrigin::exact(value)
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = usize::try_from(state.upload_config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state))
}
