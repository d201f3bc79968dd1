//! The worker's polling API for generation jobs.
//!
//! Independent of the event channel: a job started here is tracked by the
//! worker's own id and read back with plain requests, so it still works
//! after the channel has given up.

use cadence_core::GenerationParameters;
use serde::Serialize;
use tracing::info;

use super::{check, decode, ArtifactSummary, CatalogClient, CatalogError, GenerationJob};

#[derive(Serialize)]
struct StartRequest<'a> {
    parameters: &'a GenerationParameters,
}

impl CatalogClient {
    /// `POST /generate`. The returned job is `pending`.
    pub async fn start_generation(
        &self,
        parameters: &GenerationParameters,
    ) -> Result<GenerationJob, CatalogError> {
        parameters.validate()?;
        let response = self
            .http
            .post(self.endpoint(&["generate"]))
            .json(&StartRequest { parameters })
            .send()
            .await?;
        let job: GenerationJob = decode(check(response, None).await?).await?;
        info!(job_id = %job.job_id, "generation job started");
        Ok(job)
    }

    /// `GET /generate/{job_id}/status`.
    pub async fn job_status(&self, job_id: &str) -> Result<GenerationJob, CatalogError> {
        let response = self
            .http
            .get(self.endpoint(&["generate", job_id, "status"]))
            .send()
            .await?;
        decode(check(response, Some(job_id)).await?).await
    }

    /// `GET /generate/{job_id}/result`. The worker answers 400 until the job
    /// has completed, surfaced as [`CatalogError::Status`].
    pub async fn job_result(&self, job_id: &str) -> Result<ArtifactSummary, CatalogError> {
        let response = self
            .http
            .get(self.endpoint(&["generate", job_id, "result"]))
            .send()
            .await?;
        decode(check(response, Some(job_id)).await?).await
    }
}
