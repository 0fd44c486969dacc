use async_trait::async_trait;
use url::Url;

use super::{RestClient, YarnService};
use crate::config::join_path;
use crate::error::Result;
use crate::models::{AppAttempts, AppAttemptsEnvelope, YarnApp, YarnAppEnvelope};

/// Client for `{yarnBase}/{appId}` and `{yarnBase}/{appId}/appattempts`.
pub struct YarnRestClient {
    rest: RestClient,
    base: Url,
}

impl YarnRestClient {
    pub fn new(rest: RestClient, base: Url) -> Self {
        Self { rest, base }
    }

    fn app_url(&self, app_id: &str) -> Result<Url> {
        join_path(&self.base, app_id)
    }

    fn attempts_url(&self, app_id: &str) -> Result<Url> {
        join_path(&self.base, &format!("{app_id}/appattempts"))
    }
}

#[async_trait]
impl YarnService for YarnRestClient {
    async fn app(&self, app_id: &str) -> Result<YarnApp> {
        let envelope: YarnAppEnvelope = self.rest.get_json(self.app_url(app_id)?, "yarn app").await?;
        Ok(envelope.app)
    }

    async fn app_attempts(&self, app_id: &str) -> Result<AppAttempts> {
        let url = self.attempts_url(app_id)?;
        let envelope: AppAttemptsEnvelope = self.rest.get_json(url, "yarn app attempts").await?;
        Ok(envelope.app_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, HttpClientConfig};

    #[test]
    fn app_urls_hang_off_the_yarn_base() {
        let cluster = ClusterConfig::new(Url::parse("https://demo.example.com").unwrap());
        let client = YarnRestClient::new(
            RestClient::new(&HttpClientConfig::default(), None).unwrap(),
            cluster.yarn_base().unwrap(),
        );
        assert_eq!(
            client.app_url("application_1_0001").unwrap().as_str(),
            "https://demo.example.com/yarnui/ws/v1/cluster/apps/application_1_0001"
        );
        assert_eq!(
            client.attempts_url("application_1_0001").unwrap().as_str(),
            "https://demo.example.com/yarnui/ws/v1/cluster/apps/application_1_0001/appattempts"
        );
    }
}
