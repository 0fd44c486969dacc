//! Getting the job artifact onto storage the cluster can read.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::config::ClusterConfig;
use crate::error::{EngineError, Result};
use crate::models::SubmissionParams;

/// Schemes the cluster can read job artifacts from directly.
const REMOTE_SCHEMES: [&str; 7] = ["wasb", "wasbs", "abfs", "abfss", "adl", "hdfs", "https"];

/// Places a local artifact somewhere `cluster` can read it.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, local: &str, cluster: &ClusterConfig) -> Result<Url>;
}

/// Uploader for artifacts that already live on cluster storage.
///
/// Remote URIs pass through unchanged; anything else is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteArtifact;

#[async_trait]
impl ArtifactUploader for RemoteArtifact {
    async fn upload(&self, local: &str, _cluster: &ClusterConfig) -> Result<Url> {
        match Url::parse(local) {
            Ok(url) if REMOTE_SCHEMES.contains(&url.scheme()) => Ok(url),
            _ => Err(EngineError::configuration(format!(
                "`{local}` is not on cluster storage; upload it to one of {} first",
                REMOTE_SCHEMES.join(", ")
            ))),
        }
    }
}

/// Replace `params.file` with the location returned by `uploader`.
pub async fn stage_artifact(
    uploader: &dyn ArtifactUploader,
    mut params: SubmissionParams,
    cluster: &ClusterConfig,
) -> Result<SubmissionParams> {
    let remote = uploader.upload(&params.file, cluster).await?;
    debug!(local = %params.file, remote = %remote, "Artifact staged");
    params.file = remote.into();
    Ok(params)
}
