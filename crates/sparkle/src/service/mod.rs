//! Remote service boundary.
//!
//! Everything above this module talks to the cluster through these traits, so
//! the polling logic can run against the real REST clients or in-memory fakes.

mod http;
mod livy;
mod serverless;
mod yarn;

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::error::Result;
use crate::models::{AppAttempts, SubmissionParams, YarnApp};
use crate::state::JobState;

pub use http::{ContainerLogClient, RestClient};
pub use livy::LivyBackend;
pub use serverless::ServerlessBackend;
pub use yarn::YarnRestClient;

/// Identifies a submitted batch job towards its backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Integer batch id, once the batch service has assigned one.
    pub id: Option<u64>,
    /// Path segment addressing the job in REST URLs.
    pub path: String,
}

impl BatchKey {
    pub fn numeric(id: u64) -> Self {
        Self {
            id: Some(id),
            path: id.to_string(),
        }
    }

    /// A job addressed by path whose integer id is not known yet.
    pub fn job(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// One observation of a batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub key: BatchKey,
    pub state: JobState,
    pub app_id: Option<String>,
    pub driver_log_url: Option<String>,
    /// Scheduler state reported by backends that queue jobs before Livy sees them.
    pub scheduler_state: Option<String>,
    pub log: Vec<String>,
    /// Response body as received.
    pub raw: String,
}

impl BatchStatus {
    pub fn new(key: BatchKey, state: JobState) -> Self {
        Self {
            key,
            state,
            app_id: None,
            driver_log_url: None,
            scheduler_state: None,
            log: Vec::new(),
            raw: String::new(),
        }
    }
}

/// Result of a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The service accepted the request.
    Accepted,
    /// The service answered with a non-success status. Usually the job already ended.
    Rejected { status: StatusCode },
    /// No request was sent because the job was already observed in a terminal state.
    AlreadyDone,
}

/// Submission, status, log and kill transport of one kind of batch service.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one creation request. Implementations must not retry.
    async fn submit(&self, params: &SubmissionParams) -> Result<BatchStatus>;

    async fn status(&self, key: &BatchKey) -> Result<BatchStatus>;

    /// Fetch up to `size` log lines starting at line `from`.
    async fn log_page(&self, key: &BatchKey, from: u64, size: u32) -> Result<Vec<String>>;

    async fn kill(&self, key: &BatchKey) -> Result<KillOutcome>;

    /// Whether `status` describes a job that will not change anymore.
    fn is_done(&self, status: &BatchStatus) -> bool {
        status.state.is_done()
    }
}

/// YARN resource manager REST surface.
#[async_trait]
pub trait YarnService: Send + Sync {
    async fn app(&self, app_id: &str) -> Result<YarnApp>;

    async fn app_attempts(&self, app_id: &str) -> Result<AppAttempts>;
}

/// Access to container log pages.
#[async_trait]
pub trait LogPageService: Send + Sync {
    /// Lightweight reachability check returning the HTTP status code.
    async fn probe(&self, url: &Url) -> Result<StatusCode>;

    /// Fetch a log page as HTML text.
    async fn fetch_page(&self, url: &Url) -> Result<String>;
}
