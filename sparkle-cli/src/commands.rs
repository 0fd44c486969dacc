use futures::StreamExt;
use futures::stream::BoxStream;
use sparkle_engine::{
    AppStatus, BackendKind, BatchKey, CancellationToken, ClusterConfig, DriverLog, EngineContext,
    EngineError, JobLifecycleController, KillOutcome, LogKind, LogLine, RemoteArtifact,
    SubmissionParams, stage_artifact,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// Executes CLI commands against the configured clusters.
pub struct CommandExecutor {
    config: AppConfig,
    token: CancellationToken,
}

/// What `submit` should send.
pub struct SubmitRequest {
    pub cluster: String,
    pub params: SubmissionParams,
    pub follow: bool,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, token: CancellationToken) -> Self {
        Self { config, token }
    }

    fn cluster(&self, name: &str) -> Result<&ClusterConfig> {
        Ok(self.config.clusters.get(name)?)
    }

    fn context(&self, cluster: &ClusterConfig) -> Result<EngineContext> {
        Ok(EngineContext::for_cluster(self.config.engine.clone(), cluster)?)
    }

    async fn attach(&self, cluster_name: &str, id: &str) -> Result<JobLifecycleController> {
        let cluster = self.cluster(cluster_name)?;
        let key = batch_key(cluster, id)?;
        let ctx = self.context(cluster)?;
        Ok(JobLifecycleController::attach(ctx, key, &self.token).await?)
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<()> {
        let cluster = self.cluster(&request.cluster)?;
        let params = stage_artifact(&RemoteArtifact, request.params, cluster).await?;
        let job = JobLifecycleController::submit(self.context(cluster)?, params).await?;
        println!("Submitted batch {} to {}", job.handle().key(), request.cluster);

        if request.follow {
            self.follow(&job).await?;
        }
        Ok(())
    }

    async fn follow(&self, job: &JobLifecycleController) -> Result<()> {
        let mut started = job.await_started(self.token.clone());
        while let Some(event) = started.next().await {
            match event {
                Ok(event) => info!(
                    job = %job.handle().key(),
                    batch_id = ?job.batch_id(),
                    state = %event.state,
                    "Job state"
                ),
                Err(EngineError::JobFailed { state, log }) => {
                    for line in log {
                        eprintln!("{line}");
                    }
                    return Err(AppError::JobFailed {
                        job: job.handle().key().to_string(),
                        state,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.check_cancelled(job)?;

        let lines = match job.driver_logs(DriverLog::Stdout, self.token.clone()).await {
            Ok(lines) => lines,
            Err(EngineError::NotReady { .. }) => {
                info!("Driver log not reachable, falling back to the batch log");
                job.submission_logs(self.token.clone())
            }
            Err(e) => return Err(e.into()),
        };
        print_lines(lines).await?;
        self.check_cancelled(job)?;

        let outcome = job.await_done(&self.token).await?;
        println!("Batch {} finished: {}", job.handle().key(), outcome.state);
        if !outcome.diagnostics.is_empty() {
            info!(diagnostics = %outcome.diagnostics, "Job diagnostics");
        }

        let mut aggregation = job.await_post_done(self.token.clone());
        while let Some(status) = aggregation.next().await {
            match status {
                Ok(status) => info!(status = %status, "Log aggregation"),
                Err(e) => {
                    warn!(error = %e, "Could not follow log aggregation");
                    break;
                }
            }
        }

        if outcome.is_success() {
            Ok(())
        } else {
            Err(AppError::JobFailed {
                job: job.handle().key().to_string(),
                state: outcome.state,
            })
        }
    }

    fn check_cancelled(&self, job: &JobLifecycleController) -> Result<()> {
        if self.token.is_cancelled() {
            eprintln!(
                "Stopped following batch {}; it keeps running on the cluster",
                job.handle().key()
            );
            return Err(EngineError::Cancelled.into());
        }
        Ok(())
    }

    pub async fn status(&self, cluster: &str, id: &str) -> Result<()> {
        let job = self.attach(cluster, id).await?;
        let handle = job.handle();
        println!("Batch:  {}", handle.key());
        if let Some(id) = handle.batch_id().filter(|id| id.to_string() != handle.key().path) {
            println!("Livy:   {id}");
        }
        println!("State:  {}", handle.state());
        match job.app_status(&self.token).await? {
            AppStatus::NotYetRunning => println!("YARN:   not running yet"),
            AppStatus::Known(app) => {
                println!("App:    {}", app.app_id);
                println!(
                    "YARN:   {} ({})",
                    app.state.as_deref().unwrap_or("unknown"),
                    app.final_status.as_deref().unwrap_or("UNDEFINED")
                );
                if let Some(status) = app.log_aggregation_status {
                    println!("Logs:   {status}");
                }
            }
        }
        Ok(())
    }

    pub async fn logs(&self, cluster: &str, id: &str, driver: Option<DriverLog>) -> Result<()> {
        let job = self.attach(cluster, id).await?;
        let lines = match driver {
            Some(log) => job.driver_logs(log, self.token.clone()).await?,
            None => job.submission_logs(self.token.clone()),
        };
        print_lines(lines).await
    }

    pub async fn kill(&self, cluster: &str, id: &str) -> Result<()> {
        let job = self.attach(cluster, id).await?;
        match job.kill().await? {
            KillOutcome::Accepted => println!("Kill request for batch {} accepted", job.handle().key()),
            KillOutcome::Rejected { status } => {
                println!("Batch {} was not killed: service answered {status}", job.handle().key())
            }
            KillOutcome::AlreadyDone => {
                println!("Batch {} already finished ({})", job.handle().key(), job.state())
            }
        }
        Ok(())
    }

    pub fn list_clusters(&self) {
        if self.config.clusters.is_empty() {
            println!("No clusters configured");
            return;
        }
        for name in self.config.clusters.names() {
            if let Ok(cluster) = self.config.clusters.get(name) {
                println!("{name}\t{:?}\t{}", cluster.kind, cluster.connection_url);
            }
        }
    }
}

async fn print_lines(mut lines: BoxStream<'static, sparkle_engine::Result<LogLine>>) -> Result<()> {
    while let Some(line) = lines.next().await {
        let line = line?;
        match line.kind {
            LogKind::Stderr => eprintln!("{}", line.text),
            LogKind::Stdout | LogKind::Diagnostics => println!("{}", line.text),
        }
    }
    Ok(())
}

/// Livy batches are addressed by integer id, serverless jobs by their UUID.
fn batch_key(cluster: &ClusterConfig, id: &str) -> Result<BatchKey> {
    match cluster.kind {
        BackendKind::Livy => id
            .parse::<u64>()
            .map(BatchKey::numeric)
            .map_err(|_| AppError::InvalidInput(format!("batch id must be an integer, got `{id}`"))),
        BackendKind::Serverless => Ok(BatchKey::job(id)),
    }
}
