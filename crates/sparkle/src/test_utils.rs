//! In-memory stand-ins for the remote services.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use url::Url;

use crate::error::{EngineError, Result};
use crate::models::{AppAttempt, AppAttempts, SubmissionParams, YarnApp};
use crate::service::{BatchBackend, BatchKey, BatchStatus, KillOutcome, LogPageService, YarnService};
use crate::state::{JobState, LogAggregationStatus};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn unavailable(operation: &'static str) -> EngineError {
    EngineError::http_status(StatusCode::SERVICE_UNAVAILABLE, "fake://service", operation)
}

/// Pop the next scripted item, keeping the last one for every later call.
fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Clone)]
enum Scripted {
    Status(BatchStatus),
    Unavailable,
}

/// Batch backend answering from scripted statuses.
///
/// With nothing scripted, status queries fail with a retryable error.
pub struct FakeBackend {
    statuses: Mutex<VecDeque<Scripted>>,
    log: Mutex<Vec<String>>,
    reject_submit: Mutex<Option<StatusCode>>,
    kill_outcome: Mutex<KillOutcome>,
    submitted: Mutex<Vec<SubmissionParams>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    log_calls: AtomicUsize,
    kill_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            reject_submit: Mutex::new(None),
            kill_outcome: Mutex::new(KillOutcome::Accepted),
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeBackend {
    pub const BATCH_ID: u64 = 42;

    pub fn batch_status(state: JobState, app_id: Option<&str>) -> BatchStatus {
        let mut status = BatchStatus::new(BatchKey::numeric(Self::BATCH_ID), state);
        status.app_id = app_id.map(str::to_owned);
        status.raw = format!(r#"{{"id":{},"state":"{state}"}}"#, Self::BATCH_ID);
        status
    }

    pub fn push_state(&self, state: JobState, app_id: Option<&str>) {
        self.push_status(Self::batch_status(state, app_id));
    }

    pub fn push_status(&self, status: BatchStatus) {
        self.statuses.lock().push_back(Scripted::Status(status));
    }

    pub fn push_unavailable(&self) {
        self.statuses.lock().push_back(Scripted::Unavailable);
    }

    pub fn set_log(&self, lines: Vec<String>) {
        *self.log.lock() = lines;
    }

    pub fn reject_submit(&self, status: StatusCode) {
        *self.reject_submit.lock() = Some(status);
    }

    pub fn set_kill_outcome(&self, outcome: KillOutcome) {
        *self.kill_outcome.lock() = outcome;
    }

    pub fn submitted(&self) -> Vec<SubmissionParams> {
        self.submitted.lock().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, params: &SubmissionParams) -> Result<BatchStatus> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.reject_submit.lock() {
            return Err(EngineError::SubmissionFailed {
                reason: format!("batch service answered {status}"),
            });
        }
        self.submitted.lock().push(params.clone());
        Ok(Self::batch_status(JobState::Starting, None))
    }

    async fn status(&self, _key: &BatchKey) -> Result<BatchStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match next_scripted(&self.statuses) {
            Some(Scripted::Status(status)) => Ok(status),
            Some(Scripted::Unavailable) | None => Err(unavailable("batch status")),
        }
    }

    async fn log_page(&self, _key: &BatchKey, from: u64, size: u32) -> Result<Vec<String>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let page = {
            let log = self.log.lock();
            let start = (from as usize).min(log.len());
            let end = start.saturating_add(size as usize).min(log.len());
            log[start..end].to_vec()
        };
        tokio::task::yield_now().await;
        Ok(page)
    }

    async fn kill(&self, _key: &BatchKey) -> Result<KillOutcome> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.kill_outcome.lock())
    }
}

/// YARN resource manager answering from scripted application records.
#[derive(Default)]
pub struct FakeYarn {
    apps: Mutex<VecDeque<YarnApp>>,
    attempts: Mutex<AppAttempts>,
    app_calls: AtomicUsize,
}

impl FakeYarn {
    pub fn yarn_app(id: &str, state: &str, aggregation: Option<LogAggregationStatus>) -> YarnApp {
        YarnApp {
            id: id.to_owned(),
            state: Some(state.to_owned()),
            final_status: None,
            am_host_http_address: None,
            am_container_logs: None,
            log_aggregation_status: aggregation,
            diagnostics: None,
        }
    }

    pub fn push_app(&self, app: YarnApp) {
        self.apps.lock().push_back(app);
    }

    pub fn push_attempt(&self, id: u32, logs_link: &str) {
        self.attempts.lock().app_attempt.push(AppAttempt {
            id,
            container_id: None,
            node_http_address: None,
            logs_link: Some(logs_link.to_owned()),
        });
    }

    pub fn app_calls(&self) -> usize {
        self.app_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl YarnService for FakeYarn {
    async fn app(&self, _app_id: &str) -> Result<YarnApp> {
        self.app_calls.fetch_add(1, Ordering::SeqCst);
        next_scripted(&self.apps).ok_or_else(|| unavailable("yarn application"))
    }

    async fn app_attempts(&self, _app_id: &str) -> Result<AppAttempts> {
        Ok(self.attempts.lock().clone())
    }
}

/// Container log pages keyed by full URL.
///
/// Unknown URLs probe as 404 and serve an empty page.
#[derive(Default)]
pub struct FakeLogPages {
    statuses: Mutex<HashMap<String, StatusCode>>,
    unreachable: Mutex<HashSet<String>>,
    pages: Mutex<HashMap<String, String>>,
    probes: AtomicUsize,
}

impl FakeLogPages {
    pub fn set_status(&self, url: &Url, status: StatusCode) {
        self.statuses.lock().insert(url.to_string(), status);
    }

    pub fn set_unreachable(&self, url: &Url) {
        self.unreachable.lock().insert(url.to_string());
    }

    pub fn set_page(&self, url: &Url, html: &str) {
        self.pages.lock().insert(url.to_string(), html.to_owned());
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogPageService for FakeLogPages {
    async fn probe(&self, url: &Url) -> Result<StatusCode> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().contains(url.as_str()) {
            return Err(unavailable("log page probe"));
        }
        Ok(self
            .statuses
            .lock()
            .get(url.as_str())
            .copied()
            .unwrap_or(StatusCode::NOT_FOUND))
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        if self.unreachable.lock().contains(url.as_str()) {
            return Err(unavailable("log page"));
        }
        Ok(self.pages.lock().get(url.as_str()).cloned().unwrap_or_default())
    }
}
