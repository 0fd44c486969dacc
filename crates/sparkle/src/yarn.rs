//! YARN application tracking, independent of the batch-job state.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::{EngineError, Result};
use crate::models::{AppAttempt, YarnApp};
use crate::retry::{RetryPolicy, retry_result, sleep_or_cancel};
use crate::service::YarnService;
use crate::state::LogAggregationStatus;

static AM_ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:/\s]+):(\d{1,5})$").unwrap());

/// Host and port of the application master's web endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AmAddress {
    pub host: String,
    pub port: u16,
}

impl AmAddress {
    /// Parse `host:port` as reported in `amHostHttpAddress`.
    pub fn parse(input: &str) -> Result<Self> {
        let caps = AM_ADDRESS_REGEX
            .captures(input.trim())
            .ok_or_else(|| EngineError::parse("AM address", input))?;
        let port = caps[2]
            .parse::<u16>()
            .map_err(|_| EngineError::parse("AM address", input))?;
        Ok(Self {
            host: caps[1].to_owned(),
            port,
        })
    }
}

impl std::fmt::Display for AmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Extract the container id from an AM container-log link such as
/// `http://10.0.0.4:30060/node/containerlogs/container_e02_1_0001_01_000001/livy`.
///
/// The id is the segment right before the trailing `livy` segment.
pub fn parse_container_id(container_logs: &str) -> Result<String> {
    let path = match Url::parse(container_logs) {
        Ok(url) => url.path().to_owned(),
        Err(_) => container_logs.to_owned(),
    };
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match segments.as_slice() {
        [.., container, "livy"] if !container.is_empty() => Ok((*container).to_owned()),
        _ => Err(EngineError::parse("container log path", container_logs)),
    }
}

/// One observation of a YARN application.
#[derive(Debug, Clone, PartialEq)]
pub struct YarnAppSnapshot {
    pub app_id: String,
    pub am_address: Option<AmAddress>,
    pub am_container_logs: Option<String>,
    pub container_id: Option<String>,
    pub log_aggregation_status: Option<LogAggregationStatus>,
    pub finished: bool,
    pub state: Option<String>,
    pub final_status: Option<String>,
}

impl TryFrom<YarnApp> for YarnAppSnapshot {
    type Error = EngineError;

    /// Fields YARN has not filled in yet stay `None`; fields that are present
    /// but malformed are errors.
    fn try_from(app: YarnApp) -> Result<Self> {
        let finished = app.is_finished();
        let am_address = app
            .am_host_http_address
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(AmAddress::parse)
            .transpose()?;
        let container_logs = app.am_container_logs.filter(|s| !s.is_empty());
        let container_id = container_logs
            .as_deref()
            .map(parse_container_id)
            .transpose()?;
        Ok(Self {
            app_id: app.id,
            am_address,
            am_container_logs: container_logs,
            container_id,
            log_aggregation_status: app.log_aggregation_status,
            finished,
            state: app.state,
            final_status: app.final_status,
        })
    }
}

/// Polls the YARN REST surface for one cluster.
#[derive(Clone)]
pub struct YarnAppWatcher {
    service: Arc<dyn YarnService>,
    policy: RetryPolicy,
    interval: Duration,
}

impl YarnAppWatcher {
    pub fn new(service: Arc<dyn YarnService>, policy: RetryPolicy, interval: Duration) -> Self {
        Self {
            service,
            policy,
            interval,
        }
    }

    /// Fetch the application once, retrying transport errors.
    pub async fn snapshot(&self, app_id: &str, token: &CancellationToken) -> Result<YarnAppSnapshot> {
        let service = self.service.as_ref();
        let app = retry_result(&self.policy, token, move |_| service.app(app_id)).await?;
        YarnAppSnapshot::try_from(app)
    }

    /// The most recent attempt of the application, if YARN reports any.
    pub async fn latest_attempt(
        &self,
        app_id: &str,
        token: &CancellationToken,
    ) -> Result<Option<AppAttempt>> {
        let service = self.service.as_ref();
        let attempts =
            retry_result(&self.policy, token, move |_| service.app_attempts(app_id)).await?;
        Ok(attempts.latest().cloned())
    }

    /// Resolve where the driver runs. Retries while YARN has not published the
    /// AM address yet.
    pub async fn driver_address(&self, app_id: &str, token: &CancellationToken) -> Result<AmAddress> {
        let service = self.service.as_ref();
        retry_result(&self.policy, token, move |_| async move {
            let app = service.app(app_id).await?;
            let snapshot = YarnAppSnapshot::try_from(app)?;
            snapshot.am_address.ok_or(EngineError::NotReady {
                resource: "application master address",
            })
        })
        .await
    }

    /// Emit a snapshot every poll until the application is finished or `until`
    /// holds. The matching snapshot is the last item.
    pub fn watch<F>(
        &self,
        app_id: impl Into<String>,
        until: F,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<YarnAppSnapshot>>
    where
        F: Fn(&YarnAppSnapshot) -> bool + Send + 'static,
    {
        self.poll(app_id.into(), token, move |s| s.finished || until(s))
    }

    /// Emit each new log aggregation status until it is terminal.
    pub fn watch_log_aggregation(
        &self,
        app_id: impl Into<String>,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<LogAggregationStatus>> {
        let app_id = app_id.into();
        let mut last = None;
        self.poll(app_id, token, |s| {
            s.log_aggregation_status
                .is_some_and(|status| status.is_done() || status == LogAggregationStatus::Disabled)
        })
        .filter_map(move |item| {
            let out = match item {
                Ok(snapshot) => match snapshot.log_aggregation_status {
                    Some(status) if last != Some(status) => {
                        last = Some(status);
                        Some(Ok(status))
                    }
                    _ => None,
                },
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(out)
        })
        .boxed()
    }

    fn poll<F>(
        &self,
        app_id: String,
        token: CancellationToken,
        stop: F,
    ) -> BoxStream<'static, Result<YarnAppSnapshot>>
    where
        F: Fn(&YarnAppSnapshot) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(4);
        let watcher = self.clone();
        tokio::spawn(async move {
            loop {
                match watcher.snapshot(&app_id, &token).await {
                    Ok(snapshot) => {
                        if token.is_cancelled() {
                            break;
                        }
                        let done = stop(&snapshot);
                        debug!(
                            app_id = %app_id,
                            state = ?snapshot.state,
                            aggregation = ?snapshot.log_aggregation_status,
                            done,
                            "YARN application polled"
                        );
                        if tx.send(Ok(snapshot)).await.is_err() || done {
                            break;
                        }
                    }
                    Err(EngineError::Cancelled) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
                if sleep_or_cancel(watcher.interval, &token).await.is_err() {
                    break;
                }
            }
            info!(app_id = %app_id, "YARN watch finished");
        });
        ReceiverStream::new(rx).boxed()
    }
}
