//! Thin client for the platform's web API.
//!
//! Every call attaches the current credential bag as a `Cookie` header.
//! Query strings are passed pre-encoded so a signed query reaches the wire
//! byte-for-byte as it was digested.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bilimon_core::encode_query;
use bilimon_domain::config::HttpConfig;
use bilimon_domain::constants::{
    NAV_PATH, QR_GENERATE_PATH, QR_POLL_PATH, TICKET_KEY_ID, TICKET_PATH,
};
use bilimon_domain::{BiliMonError, CredentialBag, Envelope, Result};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::Method;
use tracing::{debug, instrument, warn};

use crate::auth::CredentialStore;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Status and undecoded body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    /// Decode the body as a `{code, message, data}` envelope.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::Serialization` when the body is not one.
    pub fn envelope(&self) -> Result<Envelope> {
        serde_json::from_str(&self.body).map_err(|e| InfraError::from(e).into())
    }
}

/// Endpoints and transport settings for [`BiliApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiliApiConfig {
    pub api_base: String,
    pub passport_base: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&HttpConfig> for BiliApiConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            passport_base: config.passport_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Platform HTTP client: browser headers, session cookies and `Set-Cookie`
/// absorption on every call.
#[derive(Debug)]
pub struct BiliApi {
    http: HttpClient,
    config: BiliApiConfig,
    credentials: Arc<CredentialStore>,
}

impl BiliApi {
    /// # Errors
    ///
    /// Returns `BiliMonError::Config` for a zero timeout or when the HTTP
    /// client cannot be built.
    pub fn new(config: BiliApiConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config, credentials })
    }

    /// Store whose bag is sent as `Cookie` and which absorbs `Set-Cookie`.
    pub const fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// GET `{api_base}{path}?{query}` once.
    ///
    /// Non-2xx statuses are returned, not raised; classification is the
    /// caller's job.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::Network` on connection failure or timeout.
    pub async fn get(&self, path: &str, query: &str) -> Result<RawResponse> {
        let url = join_url(&self.config.api_base, path, query);
        self.execute(Method::GET, &url).await
    }

    /// Navigation endpoint; carries the current `wbi_img` URLs.
    ///
    /// # Errors
    ///
    /// Transport errors or an undecodable body.
    #[instrument(skip(self))]
    pub async fn nav(&self) -> Result<Envelope> {
        self.get(NAV_PATH, "").await?.envelope()
    }

    /// Request an elevated-auth ticket.
    ///
    /// # Errors
    ///
    /// Transport errors or an undecodable body.
    #[instrument(skip(self, hexsign, csrf))]
    pub async fn gen_web_ticket(&self, hexsign: &str, ts: i64, csrf: &str) -> Result<Envelope> {
        let params: BTreeMap<String, String> = [
            ("key_id", TICKET_KEY_ID.to_string()),
            ("hexsign", hexsign.to_string()),
            ("context[ts]", ts.to_string()),
            ("csrf", csrf.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let url = join_url(&self.config.api_base, TICKET_PATH, &encode_query(&params));
        self.execute(Method::POST, &url).await?.envelope()
    }

    /// Start a QR login; `data` carries `url` and `qrcode_key`.
    ///
    /// # Errors
    ///
    /// Transport errors or an undecodable body.
    pub async fn qr_generate(&self) -> Result<Envelope> {
        let url = join_url(&self.config.passport_base, QR_GENERATE_PATH, "");
        self.execute(Method::GET, &url).await?.envelope()
    }

    /// Poll a QR login; `data.code` carries the login state.
    ///
    /// # Errors
    ///
    /// Transport errors or an undecodable body.
    pub async fn qr_poll(&self, qrcode_key: &str) -> Result<Envelope> {
        let query = format!("qrcode_key={}", urlencoding::encode(qrcode_key));
        let url = join_url(&self.config.passport_base, QR_POLL_PATH, &query);
        self.execute(Method::GET, &url).await?.envelope()
    }

    async fn execute(&self, method: Method, url: &str) -> Result<RawResponse> {
        let mut request = self.http.request(method, url);
        if let Some(cookie) = self.credentials.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = self.http.send(request).await?;
        self.absorb_set_cookies(response.headers()).await;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| BiliMonError::from(InfraError::from(e)))?;

        debug!(status, bytes = body.len(), "read response body");
        Ok(RawResponse { status, body })
    }

    /// Merge tokens a response sets into the credential store, like a
    /// browser cookie jar would.
    async fn absorb_set_cookies(&self, headers: &HeaderMap) {
        let tokens = set_cookie_tokens(headers);
        if tokens.is_empty() {
            return;
        }
        debug!(tokens = tokens.len(), "response set cookies");
        if let Err(e) = self.credentials.merge_tokens(&tokens).await {
            warn!(error = %e, "failed to persist cookies set by response");
        }
    }
}

/// `name=value` of every `Set-Cookie` header; attributes and cleared
/// (empty) cookies are dropped.
fn set_cookie_tokens(headers: &HeaderMap) -> CredentialBag {
    CredentialBag::from_pairs(headers.get_all(SET_COOKIE).iter().filter_map(|value| {
        let raw = value.to_str().ok()?;
        let pair = raw.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let (name, value) = (name.trim(), value.trim());
        (!name.is_empty() && !value.is_empty()).then(|| (name.to_string(), value.to_string()))
    }))
}

fn join_url(base: &str, path: &str, query: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    if query.is_empty() {
        format!("{base}{path}")
    } else {
        format!("{base}{path}?{query}")
    }
}
