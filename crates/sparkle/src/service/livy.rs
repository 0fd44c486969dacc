use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;

use super::{BatchBackend, BatchKey, BatchStatus, KillOutcome, RestClient};
use crate::config::join_path;
use crate::error::{EngineError, Result};
use crate::models::{BatchLogResponse, BatchResponse, SubmissionParams};

/// Batch transport of a cluster-resident Livy server.
pub struct LivyBackend {
    rest: RestClient,
    base: Url,
}

impl LivyBackend {
    pub fn new(rest: RestClient, base: Url) -> Self {
        Self { rest, base }
    }

    fn batches_url(&self) -> Result<Url> {
        join_path(&self.base, "batches")
    }

    /// Status and kill target.
    fn batch_url(&self, key: &BatchKey) -> Result<Url> {
        join_path(&self.base, &format!("batches/{}", key.path))
    }

    fn log_url(&self, key: &BatchKey, from: u64, size: u32) -> Result<Url> {
        let mut url = join_path(&self.base, &format!("batches/{}/log", key.path))?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_string())
            .append_pair("size", &size.to_string());
        Ok(url)
    }
}

fn into_status(batch: BatchResponse, raw: String) -> BatchStatus {
    let driver_log_url = batch.driver_log_url().map(str::to_owned);
    BatchStatus {
        key: BatchKey::numeric(batch.id),
        state: batch.state,
        app_id: batch.app_id.filter(|id| !id.is_empty()),
        driver_log_url,
        scheduler_state: None,
        log: batch.log,
        raw,
    }
}

#[async_trait]
impl BatchBackend for LivyBackend {
    fn name(&self) -> &'static str {
        "livy"
    }

    async fn submit(&self, params: &SubmissionParams) -> Result<BatchStatus> {
        let url = self.batches_url()?;
        let request = self.rest.request(Method::POST, url.clone()).json(params);
        let (batch, raw) = self
            .rest
            .send_json::<BatchResponse>(request, "submit")
            .await
            .map_err(|e| EngineError::SubmissionFailed {
                reason: e.to_string(),
            })?;
        info!(batch_id = batch.id, url = %url, "Batch job submitted");
        Ok(into_status(batch, raw))
    }

    async fn status(&self, key: &BatchKey) -> Result<BatchStatus> {
        let request = self.rest.request(Method::GET, self.batch_url(key)?);
        let (batch, raw) = self.rest.send_json::<BatchResponse>(request, "status").await?;
        debug!(batch_id = batch.id, state = %batch.state, app_id = ?batch.app_id, "Batch status");
        Ok(into_status(batch, raw))
    }

    async fn log_page(&self, key: &BatchKey, from: u64, size: u32) -> Result<Vec<String>> {
        let request = self.rest.request(Method::GET, self.log_url(key, from, size)?);
        let (page, _) = self.rest.send_json::<BatchLogResponse>(request, "log").await?;
        Ok(page.log)
    }

    async fn kill(&self, key: &BatchKey) -> Result<KillOutcome> {
        let url = self.batch_url(key)?;
        let response = self.rest.request(Method::DELETE, url).send().await?;
        let status = response.status();
        if status.is_success() {
            info!(batch = %key, "Batch job kill accepted");
            Ok(KillOutcome::Accepted)
        } else {
            warn!(batch = %key, %status, "Batch job kill rejected");
            Ok(KillOutcome::Rejected { status })
        }
    }
}
