pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::path::PathBuf;

use crate::app::rate_limiter::RateLimiter;
use crate::app::upload_policy::UploadPolicy;
use crate::config::AppConfig;
use crate::infra::{db::Db, storage::MediaStore};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub store: MediaStore,
    pub upload_policy: UploadPolicy,
    pub rate_limiter: RateLimiter,
    pub uploads_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    pub session_key: [u8; 32],
    pub token_key: [u8; 32],
    pub session_ttl_hours: u64,
    pub video_max_bytes: i64,
}

impl AppState {
    pub fn from_parts(config: &AppConfig, db: Db, store: MediaStore) -> Self {
        Self {
            db,
            store,
            upload_policy: UploadPolicy::from_config(config),
            rate_limiter: RateLimiter::new(
                config.rate_limit_window_seconds,
                config.rate_limit_max_requests,
            ),
            uploads_dir: config.uploads_dir.clone(),
            admin_username: config.admin_username.clone(),
            admin_password: config.admin_password.clone(),
            session_key: config.session_key,
            token_key: config.token_key,
            session_ttl_hours: config.session_ttl_hours,
            video_max_bytes: config.video_max_bytes,
        }
    }
}
