use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::app::auth::AuthService;
use crate::app::media::{AdminListQuery, MediaService, NewUpload, UploadError};
use crate::app::upload_policy::UploadRejection;
use crate::domain::admin::AdminIdentity;
use crate::domain::media::{MediaKind, MediaRecord, Section};
use crate::http::auth::{bearer_token, session_cookie, AdminUser, SESSION_COOKIE};
use crate::http::AppError;
use crate::AppState;

/// Uniform response envelope: `{success, data?, message?}`.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

impl ApiResponse<()> {
    pub fn message_only(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.admin_username.clone(),
        state.admin_password.clone(),
        state.session_key,
        state.token_key,
        state.session_ttl_hours,
    )
}

fn media_service(state: &AppState) -> MediaService {
    MediaService::new(
        state.db.clone(),
        state.store.clone(),
        state.upload_policy.clone(),
    )
}

fn parse_section(value: &str) -> Result<Section, AppError> {
    Section::parse(value).ok_or_else(|| {
        AppError::bad_request(format!(
            "Invalid section. Must be one of: {}",
            Section::allowed_list()
        ))
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "OK"
    } else {
        "degraded"
    };
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(HealthResponse { status, timestamp })
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: AdminIdentity,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.username.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::bad_request("Username and password are required"));
    }

    let outcome = auth_service(&state)
        .login(&payload.username, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("Internal server error")
        })?;

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => return Err(AppError::unauthorized("Invalid credentials")),
    };

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        outcome.session_id,
        state.session_ttl_hours * 3600
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            token: outcome.token,
            user: outcome.identity,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(session_id) = session_cookie(&headers) {
        auth_service(&state)
            .destroy_session(&session_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to destroy session");
                AppError::internal("Could not log out")
            })?;
    }

    let expired = format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE);
    Ok((
        [(header::SET_COOKIE, expired)],
        ApiResponse::message_only("Logged out successfully"),
    ))
}

#[derive(Serialize)]
pub struct AuthStatusResponse {
    pub success: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminIdentity>,
}

pub async fn auth_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthStatusResponse>, AppError> {
    let user = match session_cookie(&headers) {
        Some(session_id) => auth_service(&state)
            .authenticate_session(&session_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to check session");
                AppError::internal("Internal server error")
            })?,
        None => None,
    };

    Ok(Json(AuthStatusResponse {
        success: true,
        authenticated: user.is_some(),
        user,
    }))
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user: AdminIdentity,
}

pub async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::unauthorized("No token provided"))?;

    let identity = auth_service(&state)
        .authenticate_token(&token)
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to verify token");
            AppError::internal("Internal server error")
        })?
        .ok_or_else(|| AppError::unauthorized("Invalid token"))?;

    Ok(Json(VerifyResponse {
        success: true,
        user: identity,
    }))
}

// ---------------------------------------------------------------------------
// Public media reads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MediaListQuery {
    pub section: Option<String>,
}

pub async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<MediaListQuery>,
) -> Result<Json<ApiResponse<Vec<MediaRecord>>>, AppError> {
    let section = query
        .section
        .as_deref()
        .map(parse_section)
        .transpose()?;

    let media = media_service(&state).list(section).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list media");
        AppError::internal("Error fetching media")
    })?;

    Ok(ApiResponse::ok(media))
}

pub async fn list_media_by_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
) -> Result<Json<ApiResponse<Vec<MediaRecord>>>, AppError> {
    let section = parse_section(&section)?;

    let media = media_service(&state)
        .list(Some(section))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, section = %section, "failed to list media");
            AppError::internal("Error fetching media")
        })?;

    Ok(ApiResponse::ok(media))
}

pub async fn serve_media(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let served = media_service(&state).serve(id).await.map_err(|err| {
        tracing::error!(error = ?err, id = id, "failed to serve media");
        AppError::internal("Error serving media")
    })?;

    let (record, bytes) = served.ok_or_else(|| AppError::not_found("Media not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, record.mime_type.clone()),
            (header::CONTENT_LENGTH, bytes.len().to_string()),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000".to_string(),
            ),
        ],
        bytes,
    ))
}

// ---------------------------------------------------------------------------
// Admin media writes
// ---------------------------------------------------------------------------

pub async fn upload_media(
    _admin: AdminUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut section = None;
    let mut media_type = None;
    let mut title = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Upload error: {}", err)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(AppError::bad_request(
                        UploadRejection::TooManyFiles.to_string(),
                    ));
                }
                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Upload error: {}", err)))?;
                file = Some((original_name, content_type, bytes));
            }
            "section" => section = text_field(field).await?,
            "mediaType" => media_type = text_field(field).await?,
            "title" => title = text_field(field).await?,
            "description" => description = text_field(field).await?,
            _ => {
                // A second file under any other field name is still one
                // file too many; stray text fields are ignored.
                if field.file_name().is_some() {
                    return Err(AppError::bad_request(
                        UploadRejection::TooManyFiles.to_string(),
                    ));
                }
            }
        }
    }

    let (section, media_type, title, description) = match (section, media_type, title, description)
    {
        (Some(section), Some(media_type), Some(title), Some(description)) => {
            (section, media_type, title, description)
        }
        _ => {
            return Err(AppError::bad_request(
                "Missing required fields: section, mediaType, title, description",
            ))
        }
    };

    let (original_name, content_type, bytes) = file.ok_or_else(|| {
        AppError::bad_request(UploadRejection::MissingFile.to_string())
    })?;

    let section = parse_section(&section)?;
    let declared_kind = MediaKind::parse(&media_type).ok_or_else(|| {
        AppError::bad_request("Invalid mediaType. Must be \"image\" or \"video\"")
    })?;

    let record = media_service(&state)
        .upload(NewUpload {
            original_name,
            section,
            declared_kind,
            title,
            description,
            content_type,
            bytes,
        })
        .await
        .map_err(|err| match err {
            UploadError::Rejected(rejection) => AppError::bad_request(rejection.to_string()),
            UploadError::Internal(err) => {
                tracing::error!(error = ?err, "failed to upload media");
                AppError::internal("Error uploading media")
            }
        })?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(record, "Media uploaded successfully"),
    ))
}

/// Read a text field, normalizing whitespace-only values to absent so the
/// required-field check treats them as missing.
async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<Option<String>, AppError> {
    let value = field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("Upload error: {}", err)))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[derive(Deserialize)]
pub struct UpdateMediaRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

pub async fn update_media(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateMediaRequest>,
) -> Result<Json<ApiResponse<MediaRecord>>, AppError> {
    let title = payload.title.as_deref().unwrap_or("").trim().to_string();
    let description = payload
        .description
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    if title.is_empty() || description.is_empty() {
        return Err(AppError::bad_request("Title and description are required"));
    }

    let record = media_service(&state)
        .update(id, &title, &description)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, id = id, "failed to update media");
            AppError::internal("Error updating media")
        })?
        .ok_or_else(|| AppError::not_found("Media not found"))?;

    Ok(ApiResponse::with_message(
        record,
        "Media updated successfully",
    ))
}

pub async fn delete_media(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let deleted = media_service(&state).delete(id).await.map_err(|err| {
        tracing::error!(error = ?err, id = id, "failed to delete media");
        AppError::internal("Error deleting media")
    })?;

    if !deleted {
        return Err(AppError::not_found("Media not found"));
    }

    Ok(ApiResponse::message_only("Media deleted successfully"))
}

pub async fn media_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<crate::app::media::MediaStats>>, AppError> {
    let stats = media_service(&state).stats().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to compute media stats");
        AppError::internal("Error fetching statistics")
    })?;

    Ok(ApiResponse::ok(stats))
}

// ---------------------------------------------------------------------------
// Admin panel
// ---------------------------------------------------------------------------

pub async fn admin_dashboard(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<crate::app::media::Dashboard>>, AppError> {
    let dashboard = media_service(&state).dashboard().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to build dashboard");
        AppError::internal("Error fetching dashboard data")
    })?;

    Ok(ApiResponse::ok(dashboard))
}

#[derive(Deserialize)]
pub struct AdminMediaQuery {
    pub section: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn admin_media(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AdminMediaQuery>,
) -> Result<Json<ApiResponse<crate::app::media::AdminPage>>, AppError> {
    let section = query
        .section
        .as_deref()
        .map(parse_section)
        .transpose()?;
    let media_type = query
        .media_type
        .as_deref()
        .map(|value| {
            MediaKind::parse(value).ok_or_else(|| {
                AppError::bad_request("Invalid mediaType. Must be \"image\" or \"video\"")
            })
        })
        .transpose()?;

    let page = media_service(&state)
        .admin_list(AdminListQuery {
            section,
            media_type,
            page: query.page,
            limit: query.limit,
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list media for admin");
            AppError::internal("Error fetching media")
        })?;

    Ok(ApiResponse::ok(page))
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

pub async fn bulk_delete_media(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if payload.ids.is_empty() {
        return Err(AppError::bad_request("Media IDs array is required"));
    }

    let deleted = media_service(&state)
        .bulk_delete(&payload.ids)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to bulk delete media");
            AppError::internal("Error deleting media items")
        })?;

    Ok(ApiResponse::message_only(format!(
        "Successfully deleted {} media items",
        deleted
    )))
}
