use reqwest::StatusCode;

use crate::state::JobState;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("malformed response during {operation}: {reason}")]
    MalformedResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("submission failed: {reason}")]
    SubmissionFailed { reason: String },

    #[error("batch job reached {state} before it started running")]
    JobFailed { state: JobState, log: Vec<String> },

    #[error("service unavailable after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<EngineError>,
    },

    #[error("{resource} not available yet")]
    NotReady { resource: &'static str },

    #[error("failed to parse {what}: `{input}`")]
    Parse { what: &'static str, input: String },

    #[error("upload failed: {reason}")]
    Upload { reason: String },
}

impl EngineError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>, operation: &'static str) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn malformed(operation: &'static str, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn parse(what: &'static str, input: impl Into<String>) -> Self {
        Self::Parse {
            what,
            input: input.into(),
        }
    }

    /// Whether a failed call may succeed if repeated.
    ///
    /// Only transport and service errors qualify. Configuration, parse and
    /// job-level failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::MalformedResponse { .. }
            | Self::NotReady { .. } => true,
            Self::Cancelled
            | Self::Configuration { .. }
            | Self::InvalidUrl { .. }
            | Self::SubmissionFailed { .. }
            | Self::JobFailed { .. }
            | Self::RetriesExhausted { .. }
            | Self::Parse { .. }
            | Self::Upload { .. } => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
