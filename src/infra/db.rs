use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        original_name TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        section TEXT NOT NULL,
        media_type TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        mime_type TEXT NOT NULL,
        upload_date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS admin_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token_hash TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_media_section ON media(section)",
    "CREATE INDEX IF NOT EXISTS idx_media_type ON media(media_type)",
    "CREATE INDEX IF NOT EXISTS idx_media_upload_date ON media(upload_date)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON admin_sessions(expires_at)",
];

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        Self::open(&config.database_path, config.db_max_connections).await
    }

    pub async fn open(path: &str, max_connections: u32) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply the schema. Safe to run on every start: table and index
    /// creation is guarded, and the additive column for older databases
    /// tolerates already being present.
    pub async fn migrate(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        if let Err(err) = sqlx::query("ALTER TABLE media ADD COLUMN provider_url TEXT")
            .execute(&self.pool)
            .await
        {
            if !is_duplicate_column(&err) {
                return Err(err.into());
            }
        }

        Ok(())
    }
}

fn is_duplicate_column(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().contains("duplicate column name")
    )
}
