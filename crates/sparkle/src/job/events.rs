use crate::service::BatchStatus;
use crate::state::JobState;
use crate::yarn::YarnAppSnapshot;

/// One status observation surfaced while waiting for a job to start.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub state: JobState,
    pub app_id: Option<String>,
    /// Response body as received from the service.
    pub raw: String,
}

impl From<&BatchStatus> for StatusEvent {
    fn from(status: &BatchStatus) -> Self {
        Self {
            state: status.state,
            app_id: status.app_id.clone(),
            raw: status.raw.clone(),
        }
    }
}

/// Final state of a job and the diagnostics the service reported with it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub state: JobState,
    pub diagnostics: String,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

/// YARN view of the job's application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppStatus {
    /// The batch service has not assigned an application id yet.
    NotYetRunning,
    Known(YarnAppSnapshot),
}
