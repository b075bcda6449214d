use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::upload_policy::{extension_of, UploadPolicy, UploadRejection};
use crate::domain::media::{MediaKind, MediaRecord, Section};
use crate::infra::db::Db;
use crate::infra::storage::MediaStore;

/// Upload failure split by who can act on it: a rejection is the
/// client's problem, anything else is ours.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// An accepted multipart upload, fields already extracted.
#[derive(Debug)]
pub struct NewUpload {
    pub original_name: String,
    pub section: Section,
    pub declared_kind: MediaKind,
    pub title: String,
    pub description: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Serialize)]
pub struct SectionCount {
    pub section: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TypeCount {
    pub media_type: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SectionUsage {
    pub section: String,
    pub count: i64,
    pub total_size: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MediaStats {
    pub total: i64,
    pub sections: Vec<SectionCount>,
    pub types: Vec<TypeCount>,
    pub total_size: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_media: i64,
    pub total_images: i64,
    pub total_videos: i64,
    pub total_storage: i64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub recent_uploads: Vec<MediaRecord>,
    pub section_stats: Vec<SectionUsage>,
    pub recent_stats: Vec<DailyCount>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminPage {
    pub media: Vec<MediaRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Default)]
pub struct AdminListQuery {
    pub section: Option<Section>,
    pub media_type: Option<MediaKind>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Orchestrates the media pipeline: validate, place the blob, persist
/// the row, resolve the URL, and the inverse for deletion.
#[derive(Clone)]
pub struct MediaService {
    db: Db,
    store: MediaStore,
    policy: UploadPolicy,
}

impl MediaService {
    pub fn new(db: Db, store: MediaStore, policy: UploadPolicy) -> Self {
        Self { db, store, policy }
    }

    /// Full upload flow. Rejections happen before any storage write. An
    /// insert failure after the blob landed gets one best-effort cleanup
    /// attempt; if that also fails the blob is orphaned and logged.
    pub async fn upload(&self, upload: NewUpload) -> Result<MediaRecord, UploadError> {
        let detected = self
            .policy
            .validate(&upload.original_name, upload.bytes.len() as i64)?;
        if detected != upload.declared_kind {
            return Err(UploadRejection::KindMismatch {
                declared: upload.declared_kind,
                detected,
            }
            .into());
        }

        let extension = extension_of(&upload.original_name);
        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let key = format!("{}/{}", upload.section, filename);
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| mime_for_extension(&extension).to_string());
        let file_size = upload.bytes.len() as i64;

        let stored = self
            .store
            .put(&key, upload.bytes.clone(), &content_type, false)
            .await
            .map_err(UploadError::Internal)?;

        let now = OffsetDateTime::now_utc();
        let insert = sqlx::query(
            "INSERT INTO media (filename, original_name, title, description, section, \
             media_type, file_size, mime_type, provider_url, upload_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&filename)
        .bind(&upload.original_name)
        .bind(&upload.title)
        .bind(&upload.description)
        .bind(upload.section.as_str())
        .bind(detected.as_str())
        .bind(file_size)
        .bind(&content_type)
        .bind(stored.public_url.as_deref())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await;

        let result = match insert {
            Ok(result) => result,
            Err(err) => {
                // The blob is already in storage. Try to take it back out;
                // if that fails too we accept the orphan.
                if let Err(cleanup_err) = self.store.remove(&key).await {
                    tracing::error!(
                        error = ?cleanup_err,
                        key = %key,
                        "failed to clean up blob after insert failure, orphan left behind"
                    );
                }
                return Err(UploadError::Internal(err.into()));
            }
        };

        let id = result.last_insert_rowid();
        let record = self
            .get(id)
            .await
            .map_err(UploadError::Internal)?
            .ok_or_else(|| UploadError::Internal(anyhow!("inserted media row {} vanished", id)))?;
        Ok(record)
    }

    /// Newest-first listing, optionally limited to one section.
    pub async fn list(&self, section: Option<Section>) -> Result<Vec<MediaRecord>> {
        let rows = match section {
            Some(section) => {
                sqlx::query(&format!(
                    "SELECT {} FROM media WHERE section = ? ORDER BY upload_date DESC, id DESC",
                    MEDIA_COLUMNS
                ))
                .bind(section.as_str())
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM media ORDER BY upload_date DESC, id DESC",
                    MEDIA_COLUMNS
                ))
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(record_from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<MediaRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media WHERE id = ?",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Read the blob back for inline serving. `None` when either the row
    /// or the underlying blob is gone.
    pub async fn serve(&self, id: i64) -> Result<Option<(MediaRecord, Bytes)>> {
        let record = match self.get(id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let bytes = match self.store.get(&record.storage_key()).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        Ok(Some((record, bytes)))
    }

    /// Edit title and description. Timestamps refresh; everything else is
    /// immutable after upload.
    pub async fn update(
        &self,
        id: i64,
        title: &str,
        description: &str,
    ) -> Result<Option<MediaRecord>> {
        let result = sqlx::query(
            "UPDATE media SET title = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(id).await
    }

    /// Delete the row, then make a best-effort attempt at the blob. The
    /// metadata deletion is the action of record: blob-removal failure is
    /// logged and the call still succeeds.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let record = match self.get(id).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let key = record.storage_key();
        if let Err(err) = self.store.remove(&key).await {
            tracing::error!(error = ?err, key = %key, "failed to remove blob after delete");
        }

        Ok(true)
    }

    /// Delete many rows at once, cleaning blobs concurrently with the
    /// same best-effort semantics as single delete. Returns the number of
    /// rows removed.
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM media WHERE id IN (",
            MEDIA_COLUMNS
        ));
        let mut separated = select.separated(", ");
        for &id in ids {
            separated.push_bind(id);
        }
        select.push(")");
        let rows = select.build().fetch_all(self.db.pool()).await?;
        let records: Vec<MediaRecord> = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM media WHERE id IN (");
        let mut separated = delete.separated(", ");
        for &id in ids {
            separated.push_bind(id);
        }
        delete.push(")");
        let result = delete.build().execute(self.db.pool()).await?;

        let removals = records.iter().map(|record| {
            let key = record.storage_key();
            async move {
                if let Err(err) = self.store.remove(&key).await {
                    tracing::error!(error = ?err, key = %key, "failed to remove blob in bulk delete");
                }
            }
        });
        futures::future::join_all(removals).await;

        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<MediaStats> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
            .fetch_one(self.db.pool())
            .await?;

        let sections: Vec<(String, i64)> = sqlx::query_as(
            "SELECT section, COUNT(*) FROM media GROUP BY section ORDER BY COUNT(*) DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        let types: Vec<(String, i64)> =
            sqlx::query_as("SELECT media_type, COUNT(*) FROM media GROUP BY media_type")
                .fetch_all(self.db.pool())
                .await?;

        let (total_size,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(file_size), 0) FROM media")
                .fetch_one(self.db.pool())
                .await?;

        Ok(MediaStats {
            total,
            sections: sections
                .into_iter()
                .map(|(section, count)| SectionCount { section, count })
                .collect(),
            types: types
                .into_iter()
                .map(|(media_type, count)| TypeCount { media_type, count })
                .collect(),
            total_size,
        })
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let (total_media,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
            .fetch_one(self.db.pool())
            .await?;
        let (total_images,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM media WHERE media_type = 'image'")
                .fetch_one(self.db.pool())
                .await?;
        let (total_videos,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM media WHERE media_type = 'video'")
                .fetch_one(self.db.pool())
                .await?;
        let (total_storage,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(file_size), 0) FROM media")
                .fetch_one(self.db.pool())
                .await?;

        let recent_rows = sqlx::query(&format!(
            "SELECT {} FROM media ORDER BY upload_date DESC, id DESC LIMIT 10",
            MEDIA_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;
        let recent_uploads = recent_rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;

        let section_rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT section, COUNT(*), COALESCE(SUM(file_size), 0) \
             FROM media GROUP BY section ORDER BY COUNT(*) DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        // Both comparands go through the same sqlx encoding, so computing
        // the cutoff here keeps the text comparison consistent.
        let cutoff = OffsetDateTime::now_utc() - Duration::days(7);
        let daily_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT DATE(upload_date), COUNT(*) FROM media \
             WHERE upload_date >= ? GROUP BY DATE(upload_date) ORDER BY DATE(upload_date) DESC",
        )
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await?;

        Ok(Dashboard {
            summary: DashboardSummary {
                total_media,
                total_images,
                total_videos,
                total_storage,
            },
            recent_uploads,
            section_stats: section_rows
                .into_iter()
                .map(|(section, count, total_size)| SectionUsage {
                    section,
                    count,
                    total_size,
                })
                .collect(),
            recent_stats: daily_rows
                .into_iter()
                .map(|(date, count)| DailyCount { date, count })
                .collect(),
        })
    }

    /// Admin management listing: optional section and type filters plus
    /// page/limit pagination.
    pub async fn admin_list(&self, query: AdminListQuery) -> Result<AdminPage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM media");
        push_admin_filters(&mut count, &query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.db.pool())
            .await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM media", MEDIA_COLUMNS));
        push_admin_filters(&mut select, &query);
        select.push(" ORDER BY upload_date DESC, id DESC LIMIT ");
        select.push_bind(limit);
        select.push(" OFFSET ");
        select.push_bind(offset);

        let rows = select.build().fetch_all(self.db.pool()).await?;
        let media = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(AdminPage {
            media,
            pagination: Pagination {
                total,
                page,
                limit,
                total_pages: (total + limit - 1) / limit,
            },
        })
    }
}

const MEDIA_COLUMNS: &str = "id, filename, original_name, title, description, section, \
     media_type, file_size, mime_type, provider_url, upload_date, created_at, updated_at";

fn push_admin_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &AdminListQuery) {
    let mut has_condition = false;
    if let Some(section) = query.section {
        builder.push(" WHERE section = ");
        builder.push_bind(section.as_str());
        has_condition = true;
    }
    if let Some(media_type) = query.media_type {
        builder.push(if has_condition {
            " AND media_type = "
        } else {
            " WHERE media_type = "
        });
        builder.push_bind(media_type.as_str());
    }
}

fn record_from_row(row: &SqliteRow) -> Result<MediaRecord> {
    let section_raw: String = row.get("section");
    let section = Section::parse(&section_raw)
        .ok_or_else(|| anyhow!("unknown section in media row: {}", section_raw))?;

    let media_type_raw: String = row.get("media_type");
    let media_type = MediaKind::parse(&media_type_raw)
        .ok_or_else(|| anyhow!("unknown media type in media row: {}", media_type_raw))?;

    let mut record = MediaRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        title: row.get("title"),
        description: row.get("description"),
        section,
        media_type,
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        provider_url: row.get("provider_url"),
        upload_date: row.get("upload_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        url: String::new(),
    };
    record.url = record.url_source().resolve();
    Ok(record)
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
