use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::LogPageService;
use crate::config::{BasicAuth, HttpClientConfig};
use crate::error::{EngineError, Result};

/// Install the process-wide rustls crypto provider used by reqwest.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Thin wrapper around a reqwest [`Client`] that applies cluster credentials
/// and maps HTTP failures onto [`EngineError`].
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    auth: Option<BasicAuth>,
}

impl RestClient {
    pub fn new(config: &HttpClientConfig, auth: Option<BasicAuth>) -> Result<Self> {
        install_rustls_provider();
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .build()?;
        Ok(Self { client, auth })
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            // Livy rejects state-changing requests without this header when CSRF protection is on.
            .header("X-Requested-By", "sparkle");
        match &self.auth {
            Some(auth) => builder.basic_auth(&auth.username, auth.password.as_deref()),
            None => builder,
        }
    }

    /// Send a request and return the response when its status is 2xx.
    pub async fn send(&self, builder: RequestBuilder, operation: &'static str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        trace!(%status, url = %response.url(), operation, "HTTP response");
        if !status.is_success() {
            return Err(EngineError::http_status(
                status,
                response.url().as_str(),
                operation,
            ));
        }
        Ok(response)
    }

    /// Send a request and decode a successful JSON body. Returns the raw text too.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<(T, String)> {
        let response = self.send(builder, operation).await?;
        let body = response.text().await?;
        let value = serde_json::from_str(&body).map_err(|e| EngineError::malformed(operation, e))?;
        Ok((value, body))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url, operation: &'static str) -> Result<T> {
        self.send_json(self.request(Method::GET, url), operation)
            .await
            .map(|(value, _)| value)
    }
}

/// Fetches container log pages and probes candidate log URLs.
#[derive(Debug, Clone)]
pub struct ContainerLogClient {
    rest: RestClient,
}

impl ContainerLogClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl LogPageService for ContainerLogClient {
    async fn probe(&self, url: &Url) -> Result<StatusCode> {
        // HEAD is not served by every YARN UI proxy, so a plain GET is used.
        let response = self.rest.request(Method::GET, url.clone()).send().await?;
        let status = response.status();
        debug!(url = %url, %status, "Probed container log URL");
        Ok(status)
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let response = self
            .rest
            .send(self.rest.request(Method::GET, url.clone()), "container log")
            .await?;
        Ok(response.text().await?)
    }
}
