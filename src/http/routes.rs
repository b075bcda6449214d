use axum::extract::DefaultBodyLimit;
use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/status", get(handlers::auth_status))
        .route("/auth/verify", post(handlers::verify_token))
}

pub fn media(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/media", get(handlers::list_media))
        .route(
            "/media/section/:section",
            get(handlers::list_media_by_section),
        )
        .route("/media/serve/:id", get(handlers::serve_media))
        .route("/media/stats", get(handlers::media_stats))
        .route(
            "/media/upload",
            post(handlers::upload_media).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/media/:id", put(handlers::update_media))
        .route("/media/:id", delete(handlers::delete_media))
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(handlers::admin_dashboard))
        .route("/admin/media", get(handlers::admin_media))
        .route("/admin/media/bulk", delete(handlers::bulk_delete_media))
}
