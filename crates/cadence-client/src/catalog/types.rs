use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cadence_core::{Backend, GenerationParameters, Mood, MusicKey, MusicStyle, Stage};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::CatalogError;

/// One generated artifact as the catalog lists it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub file_id: String,
    pub filename: String,
    pub file_size: u64,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GenerationParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<ArtifactSummary>,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub message: String,
    pub file_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Backend name → whether it can currently generate.
    pub backends: BTreeMap<String, bool>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Lifecycle of a job started through `POST /generate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A generation job as the REST API reports it. Its id is the worker's own
/// and is unrelated to channel session ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress: u8,
    #[serde(default)]
    pub message: String,
    pub parameters: GenerationParameters,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ArtifactSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    CreatedAt,
    Filename,
    FileSize,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Filename => "filename",
            Self::FileSize => "file_size",
        }
    }
}

impl FromStr for SortBy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "filename" => Ok(Self::Filename),
            "file_size" => Ok(Self::FileSize),
            other => Err(format!("expected created_at, filename or file_size, got {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("expected asc or desc, got {other:?}")),
        }
    }
}

/// Filters and paging for `GET /files`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub backend: Option<Backend>,
    pub style: Option<MusicStyle>,
    pub mood: Option<Mood>,
    pub key: Option<MusicKey>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
            search: None,
            backend: None,
            style: None,
            mood: None,
            key: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl FileQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 12;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.page == 0 {
            return Err(CatalogError::InvalidQuery("page starts at 1".into()));
        }
        if !(1..=Self::MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(CatalogError::InvalidQuery(format!(
                "page_size must be within 1..={}, got {}",
                Self::MAX_PAGE_SIZE,
                self.page_size
            )));
        }
        Ok(())
    }

    /// Query-string pairs, omitting unset filters.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
            ("sort_by", self.sort_by.as_str().to_owned()),
            ("sort_order", self.sort_order.as_str().to_owned()),
        ];
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_owned()));
        }
        if let Some(backend) = self.backend {
            pairs.push(("backend", backend.to_string()));
        }
        if let Some(style) = self.style {
            pairs.push(("style", style.to_string()));
        }
        if let Some(mood) = self.mood {
            pairs.push(("mood", mood.to_string()));
        }
        if let Some(key) = self.key {
            pairs.push(("key", key.to_string()));
        }
        pairs
    }
}

/// The catalog reports times as RFC 3339, as a naive ISO timestamp, or as
/// raw Unix seconds straight from the file system.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => {
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            Utc.timestamp_opt(whole, nanos.min(999_999_999))
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {secs}")))
        }
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
            })
            .map_err(|e| serde::de::Error::custom(format!("bad timestamp {text:?}: {e}"))),
    }
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "flexible_timestamp")] DateTime<Utc>);

    Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(at)| at))
}
