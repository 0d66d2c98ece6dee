pub mod comments;
pub mod health;
pub mod media;
pub mod reports;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{delete, get, patch},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{middleware::auth::JwtSecret, AppState};

/// Base64 image batches make report bodies large.
const BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(AllowOrigin::any());

    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());

    Router::new()
        .route("/health", get(health::health_check))
        // Reports
        .route(
            "/reports",
            get(reports::list_reports).post(reports::create_reports),
        )
        .route(
            "/reports/{id}",
            patch(reports::patch_report).delete(reports::delete_report),
        )
        // Comments
        .route(
            "/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/comments/{id}", delete(comments::delete_comment))
        // Stored images
        .route("/media/{*path}", get(media::serve_media))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
