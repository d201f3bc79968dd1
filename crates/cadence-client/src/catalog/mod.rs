//! REST client for the artifact catalog served next to the worker.

mod error;
mod jobs;
mod types;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use cadence_core::ArtifactDescriptor;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

pub use error::CatalogError;
pub use types::{
    ArtifactSummary, BackendStatus, DeleteReceipt, FileQuery, GenerationJob, HealthReport,
    HealthStatus, JobStatus, Page, SearchResults, SortBy, SortOrder,
};

/// Default REST base, `/api` included.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let raw = base_url.into();
        let base = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| CatalogError::InvalidBaseUrl(format!("{raw}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CatalogError::InvalidBaseUrl(raw));
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    pub async fn list(&self, query: &FileQuery) -> Result<Page<ArtifactSummary>, CatalogError> {
        query.validate()?;
        let response = self
            .http
            .get(self.endpoint(&["files"]))
            .query(&query.to_pairs())
            .send()
            .await?;
        decode(check(response, None).await?).await
    }

    pub async fn get(&self, file_id: &str) -> Result<ArtifactSummary, CatalogError> {
        let response = self
            .http
            .get(self.endpoint(&["files", file_id]))
            .send()
            .await?;
        decode(check(response, Some(file_id)).await?).await
    }

    pub async fn delete(&self, file_id: &str) -> Result<DeleteReceipt, CatalogError> {
        let response = self
            .http
            .delete(self.endpoint(&["files", file_id]))
            .send()
            .await?;
        let receipt = decode(check(response, Some(file_id)).await?).await?;
        info!(file_id, "artifact deleted");
        Ok(receipt)
    }

    pub async fn download(&self, file_id: &str) -> Result<Bytes, CatalogError> {
        let (_, bytes) = self.fetch(file_id).await?;
        Ok(bytes)
    }

    /// Download into `dir`, named as the server suggests (or `<id>.mid`).
    /// Either name is reduced to its last path component.
    pub async fn download_to(&self, file_id: &str, dir: &Path) -> Result<PathBuf, CatalogError> {
        let (suggested, bytes) = self.fetch(file_id).await?;
        let filename = suggested
            .or_else(|| bare_file_name(&format!("{file_id}.mid")))
            .unwrap_or_else(|| "artifact.mid".to_owned());
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        info!(file_id, path = %path.display(), bytes = bytes.len(), "artifact downloaded");
        Ok(path)
    }

    pub fn download_url(&self, file_id: &str) -> String {
        self.endpoint(&["files", file_id, "download"]).into()
    }

    /// Absolute URL for a completed session's artifact.
    ///
    /// The worker usually reports a host-relative path such as
    /// `/api/files/<id>/download`; absolute references pass through.
    pub fn resolve(&self, artifact: &ArtifactDescriptor) -> String {
        let reference = artifact.download_reference.as_str();
        if reference.is_empty() {
            return self.download_url(&artifact.artifact_id);
        }
        self.base
            .join(reference)
            .map(String::from)
            .unwrap_or_else(|_| self.download_url(&artifact.artifact_id))
    }

    pub async fn search(&self, q: &str) -> Result<SearchResults, CatalogError> {
        let response = self
            .http
            .get(self.endpoint(&["files", "search"]))
            .query(&[("q", q)])
            .send()
            .await?;
        decode(check(response, None).await?).await
    }

    pub async fn health(&self) -> Result<HealthReport, CatalogError> {
        let response = self.http.get(self.endpoint(&["health"])).send().await?;
        decode(check(response, None).await?).await
    }

    pub async fn backends(&self) -> Result<Vec<BackendStatus>, CatalogError> {
        let response = self.http.get(self.endpoint(&["backends"])).send().await?;
        decode(check(response, None).await?).await
    }

    async fn fetch(&self, file_id: &str) -> Result<(Option<String>, Bytes), CatalogError> {
        let url = self.endpoint(&["files", file_id, "download"]);
        let response = self.http.get(url).send().await?;
        let response = check(response, Some(file_id)).await?;
        let suggested = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename);
        let bytes = response.bytes().await?;
        debug!(file_id, bytes = bytes.len(), "fetched artifact");
        Ok((suggested, bytes))
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `with_client` rejects bases that cannot carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            let _ = path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn check(response: Response, id: Option<&str>) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
        return Err(CatalogError::NotFound(id.to_owned()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(CatalogError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// `attachment; filename="out.mid"` → `out.mid`, stripped of any directories.
fn attachment_filename(header: &str) -> Option<String> {
    let raw = header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"');
    bare_file_name(raw)
}

fn bare_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_owned())
}
