use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{BatchBackend, BatchKey, BatchStatus, KillOutcome, RestClient};
use crate::config::join_path;
use crate::error::{EngineError, Result};
use crate::models::{BatchLogResponse, ServerlessBatchResponse, SubmissionParams};

const SCHEDULER_ENDED: &str = "ended";

/// Batch transport of an account-scoped serverless Spark service.
///
/// Jobs are addressed by a client-generated UUID; the service assigns the
/// integer Livy id once it accepts the job.
pub struct ServerlessBackend {
    rest: RestClient,
    account: Url,
}

impl ServerlessBackend {
    pub fn new(rest: RestClient, account: Url) -> Self {
        Self { rest, account }
    }

    fn job_url(&self, path: &str) -> Result<Url> {
        join_path(
            &self.account,
            &format!("activityTypes/spark/batchJobs/{path}"),
        )
    }

    /// `livyId` stays absent while the job is queued.
    fn into_status(job: ServerlessBatchResponse, raw: String) -> BatchStatus {
        let driver_log_url = job
            .app_info
            .as_ref()
            .and_then(|info| info.driver_log_url.clone())
            .filter(|url| !url.is_empty());
        BatchStatus {
            key: BatchKey {
                id: job.livy_id,
                path: job.id,
            },
            state: job.state,
            app_id: job.app_id.filter(|id| !id.is_empty()),
            driver_log_url,
            scheduler_state: job.scheduler_state,
            log: job.log,
            raw,
        }
    }
}

#[async_trait]
impl BatchBackend for ServerlessBackend {
    fn name(&self) -> &'static str {
        "serverless"
    }

    async fn submit(&self, params: &SubmissionParams) -> Result<BatchStatus> {
        let job_id = Uuid::new_v4().to_string();
        let url = self.job_url(&job_id)?;
        let request = self.rest.request(Method::PUT, url).json(params);
        let status = self
            .rest
            .send_json::<ServerlessBatchResponse>(request, "submit")
            .await
            .map(|(job, raw)| Self::into_status(job, raw))
            .map_err(|e| EngineError::SubmissionFailed {
                reason: e.to_string(),
            })?;
        info!(job_id = %job_id, batch_id = ?status.key.id, scheduler = ?status.scheduler_state, "Serverless batch job submitted");
        Ok(status)
    }

    async fn status(&self, key: &BatchKey) -> Result<BatchStatus> {
        let request = self.rest.request(Method::GET, self.job_url(&key.path)?);
        let (job, raw) = self
            .rest
            .send_json::<ServerlessBatchResponse>(request, "status")
            .await?;
        debug!(job_id = %job.id, state = %job.state, scheduler = ?job.scheduler_state, "Serverless job status");
        Ok(Self::into_status(job, raw))
    }

    async fn log_page(&self, key: &BatchKey, from: u64, size: u32) -> Result<Vec<String>> {
        let url = self.job_url(&format!("{}/log", key.path))?;
        let request = self
            .rest
            .request(Method::GET, url)
            .query(&[("from", from.to_string()), ("size", size.to_string())]);
        let (page, _) = self.rest.send_json::<BatchLogResponse>(request, "log").await?;
        Ok(page.log)
    }

    async fn kill(&self, key: &BatchKey) -> Result<KillOutcome> {
        let url = self.job_url(&format!("{}/cancel", key.path))?;
        let response = self.rest.request(Method::POST, url).send().await?;
        let status = response.status();
        if status.is_success() {
            info!(job_id = %key.path, "Serverless job cancel accepted");
            Ok(KillOutcome::Accepted)
        } else {
            warn!(job_id = %key.path, %status, "Serverless job cancel rejected");
            Ok(KillOutcome::Rejected { status })
        }
    }

    fn is_done(&self, status: &BatchStatus) -> bool {
        status.state.is_done()
            || status
                .scheduler_state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(SCHEDULER_ENDED))
    }
}
