use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::EngineError;
use crate::retry::{RetryPolicy, duration_ms};

pub const DEFAULT_USER_AGENT: &str = concat!("sparkle/", env!("CARGO_PKG_VERSION"));

/// Polling and retry configuration shared by a job's controller, log streamers
/// and YARN watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between status polls while waiting for the job to start.
    #[serde(with = "duration_ms")]
    pub start_poll_interval: Duration,
    /// Delay between status polls while waiting for the job to finish.
    #[serde(with = "duration_ms")]
    pub done_poll_interval: Duration,
    /// Delay between YARN polls while waiting for log aggregation.
    #[serde(with = "duration_ms")]
    pub post_done_poll_interval: Duration,
    /// Retry policy for a single remote query.
    pub retry: RetryPolicy,
    /// Maximum number of lines requested per log page.
    pub log_batch_size: u32,
    /// Delay before asking again when a log page came back empty.
    #[serde(with = "duration_ms")]
    pub log_idle_delay: Duration,
    pub http: HttpClientConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_poll_interval: Duration::from_secs(2),
            done_poll_interval: Duration::from_secs(1),
            post_done_poll_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            log_batch_size: 128,
            log_idle_delay: Duration::from_secs(3),
            http: HttpClientConfig::default(),
        }
    }
}

/// Settings for the reqwest client used against one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Overall per-request timeout. Keeps a hung service from stalling a poll loop.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub danger_accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            danger_accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Which submission transport a cluster speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Livy,
    Serverless,
}

/// Connection details of one named cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Public endpoint of the cluster, e.g. `https://name.azurehdinsight.net`.
    /// Used as the gateway when rewriting internal log URLs.
    pub connection_url: Url,
    /// Livy base URL. Defaults to `{connection_url}/livy`.
    #[serde(default)]
    pub livy_url: Option<Url>,
    /// YARN apps base URL. Defaults to `{connection_url}/yarnui/ws/v1/cluster/apps`.
    #[serde(default)]
    pub yarn_url: Option<Url>,
    /// Account endpoint for serverless batch jobs.
    #[serde(default)]
    pub account_url: Option<Url>,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
}

impl ClusterConfig {
    pub fn new(connection_url: Url) -> Self {
        Self {
            kind: BackendKind::Livy,
            connection_url,
            livy_url: None,
            yarn_url: None,
            account_url: None,
            auth: None,
        }
    }

    pub fn livy_base(&self) -> Result<Url, EngineError> {
        match &self.livy_url {
            Some(url) => Ok(url.clone()),
            None => join_path(&self.connection_url, "livy"),
        }
    }

    pub fn yarn_base(&self) -> Result<Url, EngineError> {
        match &self.yarn_url {
            Some(url) => Ok(url.clone()),
            None => join_path(&self.connection_url, "yarnui/ws/v1/cluster/apps"),
        }
    }

    pub fn account_base(&self) -> Result<Url, EngineError> {
        self.account_url.clone().ok_or_else(|| {
            EngineError::configuration("serverless cluster has no `account_url` configured")
        })
    }

    pub fn gateway(&self) -> &Url {
        &self.connection_url
    }
}

/// Named clusters known to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterRegistry {
    clusters: BTreeMap<String, ClusterConfig>,
}

impl ClusterRegistry {
    pub fn insert(&mut self, name: impl Into<String>, cluster: ClusterConfig) {
        self.clusters.insert(name.into(), cluster);
    }

    /// Look up a cluster by name. An unknown name is a configuration error.
    pub fn get(&self, name: &str) -> Result<&ClusterConfig, EngineError> {
        self.clusters.get(name).ok_or_else(|| {
            EngineError::configuration(format!(
                "no connection URI configured for cluster `{name}`"
            ))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Append path segments to a base URL, keeping whatever path it already has.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, EngineError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| EngineError::invalid_url(base.as_str(), "URL cannot be a base"))?;
        segments.pop_if_empty();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
    }
    Ok(url)
}
