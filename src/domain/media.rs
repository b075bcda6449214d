use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Fixed content categories used to namespace and filter media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Leadership,
    GlobalEnsemble,
    Refugee,
    Gem,
    Fos,
    Rcy,
    JejuGalot,
    Hyanggyo,
    Sports,
    SignLanguage,
    Awards,
    News,
}

impl Section {
    pub const ALL: [Section; 12] = [
        Section::Leadership,
        Section::GlobalEnsemble,
        Section::Refugee,
        Section::Gem,
        Section::Fos,
        Section::Rcy,
        Section::JejuGalot,
        Section::Hyanggyo,
        Section::Sports,
        Section::SignLanguage,
        Section::Awards,
        Section::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Leadership => "leadership",
            Section::GlobalEnsemble => "global-ensemble",
            Section::Refugee => "refugee",
            Section::Gem => "gem",
            Section::Fos => "fos",
            Section::Rcy => "rcy",
            Section::JejuGalot => "jeju-galot",
            Section::Hyanggyo => "hyanggyo",
            Section::Sports => "sports",
            Section::SignLanguage => "sign-language",
            Section::Awards => "awards",
            Section::News => "news",
        }
    }

    pub fn parse(value: &str) -> Option<Section> {
        Section::ALL
            .iter()
            .copied()
            .find(|section| section.as_str() == value)
    }

    /// Comma-separated list of every valid section, for rejection messages.
    pub fn allowed_list() -> String {
        Section::ALL
            .iter()
            .map(|section| section.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<MediaKind> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the media table, plus the resolved URL clients fetch it from.
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub title: String,
    pub description: String,
    pub section: Section,
    pub media_type: MediaKind,
    pub file_size: i64,
    pub mime_type: String,
    pub provider_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub url: String,
}

impl MediaRecord {
    /// Key the blob is stored under. Section-prefixed so backends that
    /// support prefix listing can enumerate a whole section at once.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.section, self.filename)
    }

    pub fn url_source(&self) -> UrlSource<'_> {
        match self.provider_url.as_deref() {
            Some(url) => UrlSource::Stored(url),
            None => UrlSource::Derived {
                section: self.section,
                filename: &self.filename,
            },
        }
    }
}

/// Where the client-facing URL of a record comes from. A URL stored by the
/// object-store backend always wins over path derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource<'a> {
    Stored(&'a str),
    Derived {
        section: Section,
        filename: &'a str,
    },
}

impl UrlSource<'_> {
    pub fn resolve(&self) -> String {
        match self {
            UrlSource::Stored(url) => (*url).to_string(),
            UrlSource::Derived { section, filename } => {
                format!("/uploads/{}/{}", section, filename)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_round_trips_every_variant() {
        for section in Section::ALL {
            assert_eq!(Section::parse(section.as_str()), Some(section));
        }
        assert_eq!(Section::parse("jeju-galot"), Some(Section::JejuGalot));
        assert_eq!(Section::parse("basketweaving"), None);
    }

    #[test]
    fn stored_url_wins_over_derivation() {
        let stored = UrlSource::Stored("https://cdn.example.com/a/b.png");
        assert_eq!(stored.resolve(), "https://cdn.example.com/a/b.png");

        let derived = UrlSource::Derived {
            section: Section::Sports,
            filename: "abc.png",
        };
        assert_eq!(derived.resolve(), "/uploads/sports/abc.png");
    }
}
