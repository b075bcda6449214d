use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::app::auth::AuthService;
use crate::domain::admin::AdminIdentity;
use crate::http::AppError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "sid";

/// Extractor admitting the configured admin to mutating endpoints.
/// Tries the session cookie first, then the bearer token; either alone
/// is sufficient. No credential is 401, a non-admin role is 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AdminIdentity);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let service = AuthService::new(
            state.db.clone(),
            state.admin_username.clone(),
            state.admin_password.clone(),
            state.session_key,
            state.token_key,
            state.session_ttl_hours,
        );

        if let Some(session_id) = session_cookie(&parts.headers) {
            let identity = service
                .authenticate_session(&session_id)
                .await
                .map_err(|err| {
                    tracing::error!(error = ?err, "failed to check session");
                    AppError::internal("Authentication failed")
                })?;
            if let Some(identity) = identity {
                if !identity.is_admin() {
                    return Err(AppError::forbidden("Admin access required"));
                }
                return Ok(AdminUser(identity));
            }
        }

        let token = match bearer_token(&parts.headers) {
            Some(token) => token,
            None => return Err(AppError::unauthorized("Authentication required")),
        };

        let identity = service.authenticate_token(&token).map_err(|err| {
            tracing::error!(error = ?err, "failed to verify token");
            AppError::internal("Authentication failed")
        })?;

        match identity {
            Some(identity) if identity.is_admin() => Ok(AdminUser(identity)),
            Some(_) => Err(AppError::forbidden("Admin access required")),
            None => Err(AppError::unauthorized("Invalid token")),
        }
    }
}

/// Pull the session id out of the Cookie header, if present.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}
