use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_path: String,
    pub uploads_dir: PathBuf,
    pub storage_backend: StorageBackendKind,
    pub object_store: ObjectStoreConfig,
    pub admin_username: String,
    pub admin_password: String,
    pub session_key: [u8; 32],
    pub token_key: [u8; 32],
    pub session_ttl_hours: u64,
    pub image_max_bytes: i64,
    pub video_max_bytes: i64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: u32,
    pub db_max_connections: u32,
}

/// Which blob backend the media service writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackendKind {
    Local,
    Object,
}

/// Settings for the S3-compatible object store. All optional here: the
/// backend is initialized lazily and complains on first use, not at boot.
#[derive(Clone, Debug, Default)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub public_endpoint: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:3000");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let storage_backend = match env_or("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackendKind::Local,
            "object" => StorageBackendKind::Object,
            other => return Err(anyhow!("unknown STORAGE_BACKEND: {}", other)),
        };

        Ok(Self {
            http_addr,
            database_path: env_or("DATABASE_PATH", "data/portfolio.db"),
            uploads_dir: PathBuf::from(env_or("UPLOADS_DIR", "uploads")),
            storage_backend,
            object_store: ObjectStoreConfig {
                endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
                public_endpoint: std::env::var("STORAGE_PUBLIC_ENDPOINT").ok(),
                region: env_or("STORAGE_REGION", "us-east-1"),
                bucket: std::env::var("STORAGE_BUCKET").ok(),
            },
            admin_username: env_or_err("ADMIN_USERNAME")?,
            admin_password: env_or_err("ADMIN_PASSWORD")?,
            session_key: env_key_32("SESSION_KEY")?,
            token_key: env_key_32("TOKEN_KEY")?,
            session_ttl_hours: env_or_parse("SESSION_TTL_HOURS", "24")?,
            image_max_bytes: env_or_parse("IMAGE_MAX_BYTES", "3145728")?,
            video_max_bytes: env_or_parse("VIDEO_MAX_BYTES", "52428800")?,
            rate_limit_window_seconds: env_or_parse("RATE_LIMIT_WINDOW_SECONDS", "900")?,
            rate_limit_max_requests: env_or_parse("RATE_LIMIT_MAX_REQUESTS", "100")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "5")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
