//! Lifecycle of a single batch job.

mod controller;
mod events;

use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::models::SubmissionParams;
use crate::service::{BatchKey, BatchStatus};
use crate::state::JobState;

pub use controller::JobLifecycleController;
pub use events::{AppStatus, JobOutcome, StatusEvent};

/// What the client knows about a submitted job.
///
/// The batch key is fixed at creation. The integer batch id and the
/// application id are recorded the first time the service reports them and
/// never change afterwards, and the recorded state never leaves a terminal
/// state once one was observed.
#[derive(Debug)]
pub struct JobHandle {
    params: Option<SubmissionParams>,
    key: BatchKey,
    batch_id: OnceLock<u64>,
    app_id: OnceLock<String>,
    state: Mutex<JobState>,
    driver_log_url: Mutex<Option<String>>,
}

impl JobHandle {
    pub(crate) fn new(params: Option<SubmissionParams>, status: &BatchStatus) -> Self {
        let handle = Self {
            params,
            key: status.key.clone(),
            batch_id: OnceLock::new(),
            app_id: OnceLock::new(),
            state: Mutex::new(status.state),
            driver_log_url: Mutex::new(None),
        };
        handle.observe(status);
        handle
    }

    /// Integer batch id. Serverless jobs have none until the service schedules them.
    pub fn batch_id(&self) -> Option<u64> {
        self.batch_id.get().copied()
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    /// Parameters the job was submitted with. `None` for attached jobs.
    pub fn params(&self) -> Option<&SubmissionParams> {
        self.params.as_ref()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.get().map(String::as_str)
    }

    /// Last recorded state.
    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn driver_log_url(&self) -> Option<String> {
        self.driver_log_url.lock().clone()
    }

    /// Fold a status observation into the handle and return the recorded state.
    pub(crate) fn observe(&self, status: &BatchStatus) -> JobState {
        if let Some(id) = status.key.id
            && self.batch_id.set(id).is_ok()
        {
            debug!(job = %self.key, batch_id = id, "Batch id assigned");
        }
        if let Some(app_id) = status.app_id.as_deref().filter(|id| !id.is_empty()) {
            self.set_app_id(app_id);
        }
        if let Some(url) = status.driver_log_url.as_deref().filter(|url| !url.is_empty()) {
            *self.driver_log_url.lock() = Some(url.to_owned());
        }

        let mut state = self.state.lock();
        if state.is_done() && *state != status.state {
            debug!(
                job = %self.key,
                recorded = %*state,
                observed = %status.state,
                "Ignoring state change after terminal state"
            );
        } else {
            *state = status.state;
        }
        *state
    }

    pub(crate) fn set_app_id(&self, app_id: &str) {
        match self.app_id.get() {
            Some(known) if known != app_id => warn!(
                job = %self.key,
                known = %known,
                reported = %app_id,
                "Service reported a different application id, keeping the first one"
            ),
            Some(_) => {}
            None => {
                if self.app_id.set(app_id.to_owned()).is_ok() {
                    debug!(job = %self.key, app_id = %app_id, "Application id assigned");
                }
            }
        }
    }
}
