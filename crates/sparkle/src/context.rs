use std::sync::Arc;

use url::Url;

use crate::config::{BackendKind, ClusterConfig, EngineConfig};
use crate::error::Result;
use crate::service::{
    BatchBackend, ContainerLogClient, LivyBackend, LogPageService, RestClient, ServerlessBackend,
    YarnRestClient, YarnService,
};
use crate::yarn::YarnAppWatcher;

/// Everything a job needs to talk to one cluster.
///
/// Cheap to clone; jobs created from the same context share HTTP connections
/// but no job state.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub backend: Arc<dyn BatchBackend>,
    pub yarn: Arc<dyn YarnService>,
    pub pages: Arc<dyn LogPageService>,
    /// Public endpoint internal log URLs are rewritten against.
    pub gateway: Url,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn BatchBackend>,
        yarn: Arc<dyn YarnService>,
        pages: Arc<dyn LogPageService>,
        gateway: Url,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            yarn,
            pages,
            gateway,
        }
    }

    /// Build the REST clients for `cluster`, sharing one HTTP client.
    pub fn for_cluster(config: EngineConfig, cluster: &ClusterConfig) -> Result<Self> {
        let rest = RestClient::new(&config.http, cluster.auth.clone())?;
        let backend: Arc<dyn BatchBackend> = match cluster.kind {
            BackendKind::Livy => Arc::new(LivyBackend::new(rest.clone(), cluster.livy_base()?)),
            BackendKind::Serverless => {
                Arc::new(ServerlessBackend::new(rest.clone(), cluster.account_base()?))
            }
        };
        let yarn = Arc::new(YarnRestClient::new(rest.clone(), cluster.yarn_base()?));
        let pages = Arc::new(ContainerLogClient::new(rest));
        Ok(Self::new(config, backend, yarn, pages, cluster.gateway().clone()))
    }

    /// A YARN watcher polling at the post-completion interval.
    pub fn yarn_watcher(&self) -> YarnAppWatcher {
        YarnAppWatcher::new(
            self.yarn.clone(),
            self.config.retry.clone(),
            self.config.post_done_poll_interval,
        )
    }
}
