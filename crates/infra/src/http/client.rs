use std::time::Duration;

use bilimon_domain::constants::{DEFAULT_ORIGIN, DEFAULT_REFERER, DEFAULT_USER_AGENT};
use bilimon_domain::BiliMonError;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::InfraError;

/// HTTP client with a finite per-request timeout.
///
/// Exactly one attempt per [`HttpClient::send`]; recovery decisions belong
/// to the caller, which knows how to classify the response.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, BiliMonError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Per-request timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute the provided request builder once.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, BiliMonError> {
        let request = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            BiliMonError::from(infra)
        })?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %redact_query(&url), "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                debug!(%method, url = %redact_query(&url), %status, "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, url = %redact_query(&url), error = %err, "HTTP request failed");
                let infra: InfraError = err.into();
                Err(BiliMonError::from(infra))
            }
        }
    }
}

/// Path only; query strings can carry csrf tokens.
fn redact_query(url: &reqwest::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

/// Headers every platform request carries besides the user agent.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(REFERER, HeaderValue::from_static(DEFAULT_REFERER));
    headers.insert(ORIGIN, HeaderValue::from_static(DEFAULT_ORIGIN));
    headers
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            default_headers: Some(browser_headers()),
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Fails if reqwest rejects the settings or the TLS backend cannot start.
    pub fn build(self) -> Result<HttpClient, BiliMonError> {
        if self.timeout.is_zero() {
            return Err(BiliMonError::Config("HTTP timeout must be greater than zero".into()));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            BiliMonError::from(infra)
        })?;

        Ok(HttpClient { client, timeout: self.timeout })
    }
}
