use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{AppStatus, JobHandle, JobOutcome, StatusEvent};
use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::logs::{
    ContainerLogSource, DriverLog, LivyLogSource, LogCursor, LogKind, LogLine, LogStreamer,
    LogUrlResolver,
};
use crate::models::SubmissionParams;
use crate::retry::{RetryAction, RetryPolicy, retry_result, retry_with_policy, sleep_or_cancel};
use crate::service::{BatchKey, BatchStatus, KillOutcome};
use crate::state::{JobState, LogAggregationStatus};

/// Drives one batch job from submission to log aggregation.
///
/// Cloning yields another view of the same job: the handle, the confirmed log
/// URL mode and the submission log cursor are shared.
#[derive(Clone)]
pub struct JobLifecycleController {
    ctx: EngineContext,
    handle: Arc<JobHandle>,
    resolver: Arc<LogUrlResolver>,
    submission_cursor: Arc<LogCursor>,
}

impl JobLifecycleController {
    fn with_handle(ctx: EngineContext, handle: JobHandle) -> Self {
        let resolver = LogUrlResolver::new(ctx.gateway.clone(), ctx.pages.clone());
        Self {
            ctx,
            handle: Arc::new(handle),
            resolver: Arc::new(resolver),
            submission_cursor: Arc::new(LogCursor::new(LogKind::Stdout)),
        }
    }

    /// Create the batch job. Exactly one request is sent; any failure is final.
    #[instrument(skip_all, fields(backend = ctx.backend.name(), file = %params.file))]
    pub async fn submit(ctx: EngineContext, params: SubmissionParams) -> Result<Self> {
        let status = ctx.backend.submit(&params).await.map_err(|e| match e {
            EngineError::SubmissionFailed { .. } => e,
            other => EngineError::SubmissionFailed {
                reason: other.to_string(),
            },
        })?;
        info!(job = %status.key, batch_id = ?status.key.id, state = %status.state, "Batch job created");
        Ok(Self::with_handle(ctx, JobHandle::new(Some(params), &status)))
    }

    /// Take over an existing batch job.
    #[instrument(skip(ctx, token), fields(backend = ctx.backend.name()))]
    pub async fn attach(ctx: EngineContext, key: BatchKey, token: &CancellationToken) -> Result<Self> {
        let backend = ctx.backend.as_ref();
        let lookup = &key;
        let status = retry_result(&ctx.config.retry, token, move |_| backend.status(lookup)).await?;
        info!(job = %status.key, batch_id = ?status.key.id, state = %status.state, "Attached to batch job");
        Ok(Self::with_handle(ctx, JobHandle::new(None, &status)))
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn batch_id(&self) -> Option<u64> {
        self.handle.batch_id()
    }

    /// Status query with the bounded retry policy. The result is folded into the handle.
    async fn query_status(&self, token: &CancellationToken) -> Result<BatchStatus> {
        let backend = self.ctx.backend.as_ref();
        let key = self.handle.key();
        let status = retry_result(&self.ctx.config.retry, token, move |_| backend.status(key)).await?;
        self.handle.observe(&status);
        Ok(status)
    }

    /// Poll until the job runs or ends.
    ///
    /// Every observation is yielded. The stream ends after a `Running` or
    /// `Success` event; a job that ends any other way ends the stream with
    /// [`EngineError::JobFailed`]. A service that keeps failing ends it with
    /// [`EngineError::RetriesExhausted`].
    pub fn await_started(&self, token: CancellationToken) -> BoxStream<'static, Result<StatusEvent>> {
        let (tx, rx) = mpsc::channel(4);
        let this = self.clone();
        tokio::spawn(async move {
            match this.run_await_started(&tx, &token).await {
                Ok(()) | Err(EngineError::Cancelled) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        ReceiverStream::new(rx).boxed()
    }

    #[instrument(skip_all, fields(job = %self.handle.key()))]
    async fn run_await_started(
        &self,
        tx: &mpsc::Sender<Result<StatusEvent>>,
        token: &CancellationToken,
    ) -> Result<()> {
        loop {
            let status = self.query_status(token).await?;
            let state = self.handle.state();
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            debug!(state = %state, app_id = ?status.app_id, "Waiting for job to start");

            let event = StatusEvent {
                state,
                ..StatusEvent::from(&status)
            };
            if tx.send(Ok(event)).await.is_err() {
                return Ok(());
            }

            if state.is_running() || state.is_success() {
                info!(state = %state, "Job started");
                return Ok(());
            }
            if state.is_done() || self.ctx.backend.is_done(&status) {
                warn!(state = %state, "Job ended before it started running");
                return Err(EngineError::JobFailed {
                    state,
                    log: status.log,
                });
            }
            sleep_or_cancel(self.ctx.config.start_poll_interval, token).await?;
        }
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Transport failures never end the wait; only cancellation does.
    #[instrument(skip_all, fields(job = %self.handle.key()))]
    pub async fn await_done(&self, token: &CancellationToken) -> Result<JobOutcome> {
        let interval = self.ctx.config.done_poll_interval;
        let policy = RetryPolicy::unbounded(interval);
        let backend = self.ctx.backend.as_ref();
        let key = self.handle.key();
        loop {
            let status = retry_result(&policy, token, move |_| backend.status(key)).await?;
            let state = self.handle.observe(&status);
            if state.is_done() || backend.is_done(&status) {
                info!(state = %state, "Job finished");
                return Ok(JobOutcome {
                    state,
                    diagnostics: status.log.join("\n"),
                });
            }
            sleep_or_cancel(interval, token).await?;
        }
    }

    /// Follow YARN log aggregation of the finished job until it settles.
    pub fn await_post_done(
        &self,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<LogAggregationStatus>> {
        match self.handle.app_id() {
            Some(app_id) => self.ctx.yarn_watcher().watch_log_aggregation(app_id, token),
            None => stream::once(async {
                Err::<LogAggregationStatus, _>(EngineError::NotReady {
                    resource: "application id",
                })
            })
            .boxed(),
        }
    }

    /// Ask the service to stop the job.
    ///
    /// Nothing is sent once the job was seen in a terminal state.
    #[instrument(skip_all, fields(job = %self.handle.key()))]
    pub async fn kill(&self) -> Result<KillOutcome> {
        let state = self.handle.state();
        if state.is_done() {
            info!(state = %state, "Job already finished, not sending kill");
            return Ok(KillOutcome::AlreadyDone);
        }
        let outcome = self.ctx.backend.kill(self.handle.key()).await?;
        match outcome {
            KillOutcome::Rejected { status } => warn!(%status, "Kill request rejected"),
            _ => info!("Kill request accepted"),
        }
        Ok(outcome)
    }

    /// YARN view of the application, if one was assigned yet.
    pub async fn app_status(&self, token: &CancellationToken) -> Result<AppStatus> {
        match self.handle.app_id() {
            Some(app_id) => {
                let snapshot = self.ctx.yarn_watcher().snapshot(app_id, token).await?;
                Ok(AppStatus::Known(snapshot))
            }
            None => Ok(AppStatus::NotYetRunning),
        }
    }

    /// Poll the batch service until it reports the YARN application id.
    #[instrument(skip_all, fields(job = %self.handle.key()))]
    pub async fn await_app_id(&self, token: &CancellationToken) -> Result<String> {
        if let Some(app_id) = self.handle.app_id() {
            return Ok(app_id.to_owned());
        }
        let backend = self.ctx.backend.as_ref();
        let handle = self.handle.as_ref();
        let app_id = retry_with_policy(&self.ctx.config.retry, token, move |_| async move {
            let status = match backend.status(handle.key()).await {
                Ok(status) => status,
                Err(e) if e.is_retryable() => return RetryAction::Retry(e),
                Err(e) => return RetryAction::Fail(e),
            };
            let state = handle.observe(&status);
            match handle.app_id() {
                Some(app_id) => RetryAction::Success(app_id.to_owned()),
                None if state.is_done() || backend.is_done(&status) => {
                    RetryAction::Fail(EngineError::JobFailed {
                        state,
                        log: status.log,
                    })
                }
                None => RetryAction::Retry(EngineError::NotReady {
                    resource: "application id",
                }),
            }
        })
        .await?;
        info!(app_id = %app_id, "Application id discovered");
        Ok(app_id)
    }

    /// Externally reachable URL of the driver container logs.
    ///
    /// `None` when no candidate URL is known yet or none of the rewritten
    /// forms answers.
    #[instrument(skip_all, fields(job = %self.handle.key()))]
    pub async fn driver_log_url(&self, token: &CancellationToken) -> Result<Option<Url>> {
        if self.handle.driver_log_url().is_none() {
            self.query_status(token).await?;
        }
        let internal = match (self.handle.driver_log_url(), self.handle.app_id()) {
            (Some(url), _) => url,
            (None, Some(app_id)) => {
                let attempt = self.ctx.yarn_watcher().latest_attempt(app_id, token).await?;
                match attempt.and_then(|attempt| attempt.logs_link) {
                    Some(link) => link,
                    None => return Ok(None),
                }
            }
            (None, None) => {
                debug!("No driver log URL known yet");
                return Ok(None);
            }
        };
        Ok(self.resolver.resolve(&internal).await)
    }

    /// Lines of the batch service log. Streams opened on the same controller
    /// share one position.
    pub fn submission_logs(&self, token: CancellationToken) -> BoxStream<'static, Result<LogLine>> {
        let source = Arc::new(LivyLogSource::new(
            self.ctx.backend.clone(),
            self.handle.key().clone(),
        ));
        LogStreamer::new(source, self.submission_cursor.clone(), &self.ctx.config).stream(token)
    }

    /// Tail the driver's stdout or stderr from the container log pages.
    pub async fn driver_logs(
        &self,
        log: DriverLog,
        token: CancellationToken,
    ) -> Result<BoxStream<'static, Result<LogLine>>> {
        let kind = LogKind::from(log);
        let url = self
            .driver_log_url(&token)
            .await?
            .ok_or(EngineError::NotReady {
                resource: "driver log URL",
            })?;
        info!(job = %self.handle.key(), url = %url, kind = %kind, "Tailing driver log");
        let source = Arc::new(ContainerLogSource::new(
            self.ctx.pages.clone(),
            url,
            kind,
            self.ctx.backend.clone(),
            self.handle.key().clone(),
        ));
        let cursor = Arc::new(LogCursor::new(kind));
        Ok(LogStreamer::new(source, cursor, &self.ctx.config).stream(token))
    }

    /// Last recorded job state.
    pub fn state(&self) -> JobState {
        self.handle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::logs::convert_log_url;
    use crate::state::DriverLogConversionMode;
    use crate::test_utils::{FakeBackend, FakeLogPages, FakeYarn, init_tracing};
    use reqwest::StatusCode;
    use std::time::Duration;
    use tokio::time::Instant;

    const INTERNAL_LOG_URL: &str =
        "http://10.0.0.4:30060/node/containerlogs/container_e02_1_0001_01_000001/livy";

    struct Fixture {
        backend: Arc<FakeBackend>,
        yarn: Arc<FakeYarn>,
        pages: Arc<FakeLogPages>,
        ctx: EngineContext,
    }

    fn fixture() -> Fixture {
        init_tracing();
        let backend = Arc::new(FakeBackend::default());
        let yarn = Arc::new(FakeYarn::default());
        let pages = Arc::new(FakeLogPages::default());
        let config = EngineConfig {
            retry: RetryPolicy::fixed(3, Duration::from_secs(3)),
            ..EngineConfig::default()
        };
        let ctx = EngineContext::new(
            config,
            backend.clone(),
            yarn.clone(),
            pages.clone(),
            Url::parse("https://demo.example.com").unwrap(),
        );
        Fixture {
            backend,
            yarn,
            pages,
            ctx,
        }
    }

    async fn submitted(f: &Fixture) -> JobLifecycleController {
        JobLifecycleController::submit(f.ctx.clone(), SubmissionParams::new("wasbs://jobs/pi.jar"))
            .await
            .unwrap()
    }

    fn without_port_url() -> Url {
        convert_log_url(
            DriverLogConversionMode::WithoutPort,
            &Url::parse(INTERNAL_LOG_URL).unwrap(),
            &Url::parse("https://demo.example.com").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn submit_then_wait_until_running() {
        let f = fixture();
        for state in [JobState::Starting, JobState::Starting, JobState::Running] {
            f.backend.push_state(state, None);
        }

        let job = submitted(&f).await;
        assert_eq!(job.batch_id(), Some(42));
        assert_eq!(f.backend.submitted()[0].file, "wasbs://jobs/pi.jar");

        let states: Vec<_> = job
            .await_started(CancellationToken::new())
            .map(|event| event.unwrap().state)
            .collect()
            .await;
        assert_eq!(
            states,
            vec![JobState::Starting, JobState::Starting, JobState::Running]
        );
        assert_eq!(job.state(), JobState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_serverless_job_starts_once_scheduled() {
        let f = fixture();
        let key = BatchKey::job("6f1c");
        let status = |state: JobState, id: Option<u64>| {
            let mut status = FakeBackend::batch_status(state, None);
            status.key = BatchKey {
                id,
                path: "6f1c".into(),
            };
            status.scheduler_state = Some(if id.is_some() { "scheduled" } else { "queued" }.into());
            status
        };
        f.backend.push_status(status(JobState::NotStarted, None));
        f.backend.push_status(status(JobState::NotStarted, None));
        f.backend.push_status(status(JobState::Starting, Some(7)));
        f.backend.push_status(status(JobState::Running, Some(7)));

        let job = JobLifecycleController::attach(f.ctx.clone(), key, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(job.batch_id(), None);

        let events: Vec<_> = job.await_started(CancellationToken::new()).collect().await;
        let states: Vec<_> = events.into_iter().map(|event| event.unwrap().state).collect();
        assert_eq!(
            states,
            vec![JobState::NotStarted, JobState::Starting, JobState::Running]
        );
        assert_eq!(job.batch_id(), Some(7));
        assert_eq!(job.handle().key().path, "6f1c");
    }

    #[tokio::test]
    async fn failed_submission_is_not_retried() {
        let f = fixture();
        f.backend.reject_submit(StatusCode::BAD_REQUEST);
        let result =
            JobLifecycleController::submit(f.ctx.clone(), SubmissionParams::new("x.jar")).await;
        assert!(matches!(result, Err(EngineError::SubmissionFailed { .. })));
        assert_eq!(f.backend.submit_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn await_started_reports_job_failure_with_log() {
        let f = fixture();
        f.backend.push_state(JobState::Starting, None);
        let mut dead = FakeBackend::batch_status(JobState::Dead, None);
        dead.log = vec!["java.lang.ClassNotFoundException: Pi".into()];
        f.backend.push_status(dead);

        let items: Vec<_> = submitted(&f)
            .await
            .await_started(CancellationToken::new())
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_ref().unwrap().state, JobState::Dead);
        match &items[2] {
            Err(EngineError::JobFailed { state, log }) => {
                assert_eq!(*state, JobState::Dead);
                assert_eq!(log, &vec!["java.lang.ClassNotFoundException: Pi".to_owned()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn await_started_is_bounded_when_service_is_down() {
        let f = fixture();
        let job = submitted(&f).await;

        let started = Instant::now();
        let items: Vec<_> = job.await_started(CancellationToken::new()).collect().await;
        assert!(started.elapsed() <= Duration::from_secs(9));
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(EngineError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(f.backend.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn await_done_never_gives_up() {
        let f = fixture();
        for _ in 0..20 {
            f.backend.push_unavailable();
        }
        let mut done = FakeBackend::batch_status(JobState::Success, None);
        done.log = vec!["stdout: ".into(), "Pi is roughly 3.14".into()];
        f.backend.push_status(done);

        let outcome = submitted(&f)
            .await
            .await_done(&CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.diagnostics, "stdout: \nPi is roughly 3.14");
        assert_eq!(f.backend.status_calls(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn await_done_stops_on_cancellation() {
        let f = fixture();
        f.backend.push_state(JobState::Running, None);
        let job = submitted(&f).await;
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });
        assert!(matches!(
            job.await_done(&token).await,
            Err(EngineError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_after_success_sends_nothing() {
        let f = fixture();
        f.backend.push_state(JobState::Success, None);
        let job = submitted(&f).await;
        job.await_done(&CancellationToken::new()).await.unwrap();

        assert_eq!(job.kill().await.unwrap(), KillOutcome::AlreadyDone);
        assert_eq!(f.backend.kill_calls(), 0);
    }

    #[tokio::test]
    async fn kill_reports_rejection_as_value() {
        let f = fixture();
        let job = submitted(&f).await;
        assert_eq!(job.kill().await.unwrap(), KillOutcome::Accepted);

        f.backend.set_kill_outcome(KillOutcome::Rejected {
            status: StatusCode::NOT_FOUND,
        });
        assert_eq!(
            job.kill().await.unwrap(),
            KillOutcome::Rejected {
                status: StatusCode::NOT_FOUND
            }
        );
        assert_eq!(f.backend.kill_calls(), 2);
    }

    #[tokio::test]
    async fn app_status_before_app_id_is_not_an_error() {
        let f = fixture();
        let job = submitted(&f).await;
        let status = job.app_status(&CancellationToken::new()).await.unwrap();
        assert_eq!(status, AppStatus::NotYetRunning);
        assert_eq!(f.yarn.app_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn app_id_is_discovered_and_kept() {
        let f = fixture();
        f.backend.push_state(JobState::Starting, None);
        f.backend.push_state(JobState::Running, Some("application_1_0001"));
        f.yarn
            .push_app(FakeYarn::yarn_app("application_1_0001", "RUNNING", None));
        let job = submitted(&f).await;
        let token = CancellationToken::new();

        assert_eq!(job.await_app_id(&token).await.unwrap(), "application_1_0001");
        assert_eq!(job.handle().app_id(), Some("application_1_0001"));

        match job.app_status(&token).await.unwrap() {
            AppStatus::Known(snapshot) => assert_eq!(snapshot.state.as_deref(), Some("RUNNING")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn job_ending_without_app_id_fails_discovery() {
        let f = fixture();
        f.backend.push_state(JobState::Dead, None);
        let job = submitted(&f).await;
        assert!(matches!(
            job.await_app_id(&CancellationToken::new()).await,
            Err(EngineError::JobFailed {
                state: JobState::Dead,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn post_done_follows_log_aggregation() {
        let f = fixture();
        f.backend
            .push_state(JobState::Success, Some("application_1_0001"));
        for status in [
            LogAggregationStatus::Running,
            LogAggregationStatus::Succeeded,
        ] {
            f.yarn.push_app(FakeYarn::yarn_app(
                "application_1_0001",
                "FINISHED",
                Some(status),
            ));
        }
        let job = submitted(&f).await;
        job.await_done(&CancellationToken::new()).await.unwrap();

        let statuses: Vec<_> = job
            .await_post_done(CancellationToken::new())
            .map(|s| s.unwrap())
            .collect()
            .await;
        assert_eq!(
            statuses,
            vec![LogAggregationStatus::Running, LogAggregationStatus::Succeeded]
        );
    }

    #[tokio::test]
    async fn post_done_without_app_id_is_not_ready() {
        let f = fixture();
        let job = submitted(&f).await;
        let items: Vec<_> = job.await_post_done(CancellationToken::new()).collect().await;
        assert!(matches!(items[..], [Err(EngineError::NotReady { .. })]));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_log_url_falls_back_to_latest_attempt() {
        let f = fixture();
        f.backend
            .push_state(JobState::Running, Some("application_1_0001"));
        f.yarn.push_attempt(1, "http://10.0.0.9:30060/node/containerlogs/old/livy");
        f.yarn.push_attempt(2, INTERNAL_LOG_URL);
        f.pages.set_status(&without_port_url(), StatusCode::OK);

        let job = submitted(&f).await;
        let url = job.driver_log_url(&CancellationToken::new()).await.unwrap();
        assert_eq!(url, Some(without_port_url()));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_log_url_is_none_before_app_exists() {
        let f = fixture();
        f.backend.push_state(JobState::Starting, None);
        let job = submitted(&f).await;
        assert_eq!(
            job.driver_log_url(&CancellationToken::new()).await.unwrap(),
            None
        );
        assert_eq!(f.pages.probe_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_logs_tail_container_stdout() {
        let f = fixture();
        let mut running = FakeBackend::batch_status(JobState::Running, Some("application_1_0001"));
        running.driver_log_url = Some(INTERNAL_LOG_URL.into());
        f.backend.push_status(running);
        f.backend.push_state(JobState::Success, Some("application_1_0001"));

        let base = without_port_url();
        f.pages.set_status(&base, StatusCode::OK);
        let first_page = base.join("livy/stdout?start=0").unwrap();
        f.pages
            .set_page(&first_page, "<pre>Pi is roughly 3.14\n</pre>");

        let job = submitted(&f).await;
        let lines: Vec<_> = job
            .driver_logs(DriverLog::Stdout, CancellationToken::new())
            .await
            .unwrap()
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec![LogLine::new(LogKind::Stdout, "Pi is roughly 3.14")]);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_logs_share_one_position() {
        let f = fixture();
        f.backend
            .set_log(vec!["stdout: ".into(), "one".into(), "two".into()]);
        f.backend.push_state(JobState::Success, None);
        let job = submitted(&f).await;

        let first: Vec<_> = job
            .submission_logs(CancellationToken::new())
            .map(|l| l.unwrap().text)
            .collect()
            .await;
        assert_eq!(first, vec!["one", "two"]);

        let second: Vec<_> = job
            .submission_logs(CancellationToken::new())
            .collect()
            .await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn attach_reads_current_state() {
        let f = fixture();
        f.backend.push_state(JobState::Running, Some("application_1_0001"));
        let job = JobLifecycleController::attach(
            f.ctx.clone(),
            BatchKey::numeric(42),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.handle().app_id(), Some("application_1_0001"));
        assert!(job.handle().params().is_none());
    }
}
