use thiserror::Error;

use crate::config::AppConfig;
use crate::domain::media::MediaKind;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];

/// Why an upload was turned away. Carries enough detail for an
/// actionable client message, including the exact limit breached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("File type .{extension} is not allowed. Allowed types: {allowed}")]
    UnsupportedType { extension: String, allowed: String },
    #[error(
        "{} file too large. Maximum size is {}MB.",
        kind_label(*.kind),
        format_mb(*.limit_bytes)
    )]
    TooLarge { kind: MediaKind, limit_bytes: i64 },
    #[error("Invalid mediaType. File is a {detected} but was declared a {declared}")]
    KindMismatch {
        declared: MediaKind,
        detected: MediaKind,
    },
    #[error("Too many files or invalid field name.")]
    TooManyFiles,
    #[error("No file uploaded")]
    MissingFile,
}

/// Size and extension rules for uploads, checked before any storage
/// write. Purely a policy object: no I/O.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    image_max_bytes: i64,
    video_max_bytes: i64,
}

impl UploadPolicy {
    pub fn new(image_max_bytes: i64, video_max_bytes: i64) -> Self {
        Self {
            image_max_bytes,
            video_max_bytes,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.image_max_bytes, config.video_max_bytes)
    }

    pub fn limit_bytes(&self, kind: MediaKind) -> i64 {
        match kind {
            MediaKind::Image => self.image_max_bytes,
            MediaKind::Video => self.video_max_bytes,
        }
    }

    /// Classify a filename by extension into image or video.
    pub fn classify(&self, original_name: &str) -> Option<MediaKind> {
        let extension = extension_of(original_name);
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Accept or reject a single upload. Returns the classification on
    /// success so callers never re-derive it.
    pub fn validate(&self, original_name: &str, size: i64) -> Result<MediaKind, UploadRejection> {
        let kind = self.classify(original_name).ok_or_else(|| {
            let allowed = IMAGE_EXTENSIONS
                .iter()
                .chain(VIDEO_EXTENSIONS.iter())
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            UploadRejection::UnsupportedType {
                extension: extension_of(original_name),
                allowed,
            }
        })?;

        let limit_bytes = self.limit_bytes(kind);
        if size > limit_bytes {
            return Err(UploadRejection::TooLarge { kind, limit_bytes });
        }

        Ok(kind)
    }
}

pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "Image",
        MediaKind::Video => "Video",
    }
}

fn format_mb(bytes: i64) -> String {
    format!("{:.1}", bytes as f64 / (1024.0 * 1024.0))
}
