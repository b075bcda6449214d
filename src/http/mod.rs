use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod middleware;
mod routes;

pub use auth::AdminUser;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    // The body limit only needs to admit the largest allowed upload;
    // per-type limits are enforced by the upload policy afterwards.
    let max_upload_bytes = (state.video_max_bytes as usize).saturating_add(1024 * 1024);

    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::media(max_upload_bytes))
        .merge(routes::admin())
        .nest_service("/uploads", ServeDir::new(state.uploads_dir.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::ip_rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
