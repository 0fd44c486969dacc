//! # Sparkle Engine
//!
//! Submits batch jobs to a Livy endpoint (or an account-scoped serverless
//! batch service), follows them through their lifecycle on YARN and tails
//! their logs while they run.
//!
//! ## Features
//!
//! - `JobLifecycleController` for submit, start, completion and log aggregation
//! - Incremental, deduplicated log streaming from the batch log or the driver container
//! - Driver log URL resolution through the cluster gateway
//! - Cancellable polling with configurable retry policies
//!

pub mod config;
mod context;
pub mod error;
pub mod job;
pub mod logs;
pub mod models;
pub mod retry;
pub mod service;
pub mod state;
pub mod upload;
pub mod yarn;

#[cfg(test)]
mod test_utils;

pub use config::{BackendKind, BasicAuth, ClusterConfig, ClusterRegistry, EngineConfig, HttpClientConfig};
pub use context::EngineContext;
pub use error::{EngineError, Result};
pub use job::{AppStatus, JobHandle, JobLifecycleController, JobOutcome, StatusEvent};
pub use logs::{DriverLog, LogKind, LogLine};
pub use models::SubmissionParams;
pub use retry::RetryPolicy;
pub use service::{BatchBackend, BatchKey, BatchStatus, KillOutcome};
pub use state::{DriverLogConversionMode, JobState, LogAggregationStatus};
pub use upload::{ArtifactUploader, RemoteArtifact, stage_artifact};
pub use yarn::{YarnAppSnapshot, YarnAppWatcher};

pub use tokio_util::sync::CancellationToken;
