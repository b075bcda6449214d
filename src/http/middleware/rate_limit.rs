use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::http::AppError;
use crate::AppState;

/// Video responses are large and fetched in range chunks by browsers, so
/// they would burn through the window immediately; the original
/// deployment exempts them and we keep that behavior.
const EXEMPT_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".webm", ".mkv"];

/// Per-IP fixed-window rate limiting across the whole surface.
pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_ascii_lowercase();
    if EXEMPT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Ok(next.run(request).await);
    }

    let ip = addr.ip().to_string();
    if state.rate_limiter.check_and_increment(&ip) {
        tracing::warn!(ip = %ip, path = %path, "IP rate limit exceeded");
        return Err(AppError::rate_limited(
            "Too many requests from this IP, please try again later.",
        ));
    }

    Ok(next.run(request).await)
}
