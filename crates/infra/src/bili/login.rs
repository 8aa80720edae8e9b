//! QR-code login against the passport endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bilimon_core::LoginFlow;
use bilimon_domain::config::LoginConfig;
use bilimon_domain::constants::{
    CODE_OK, QR_CODE_EXPIRED, QR_CODE_NOT_SCANNED, QR_CODE_SCANNED, QR_CODE_SUCCESS,
};
use bilimon_domain::{BiliMonError, CredentialBag, Envelope, Result};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::bili::BiliApi;

/// Query keys on the success URL that are navigation hints, not tokens.
const NON_TOKEN_PARAMS: [&str; 3] = ["gourl", "first_domain", "Expires"];

/// QR login failure; converts into `BiliMonError::Auth`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// The generate call failed or carried no key.
    #[error("could not start QR login: {0}")]
    Generate(String),

    /// Remote code 86038.
    #[error("QR code expired before it was confirmed")]
    Expired,

    /// Neither success nor expiry within the configured timeout.
    #[error("QR login not confirmed within {0:?}")]
    TimedOut(Duration),

    /// Success response whose URL carried no tokens.
    #[error("QR login succeeded but returned no tokens")]
    NoTokens,

    /// A poll state outside the known codes.
    #[error("unexpected QR login state {code}: {message}")]
    Unexpected { code: i64, message: String },
}

impl From<LoginError> for BiliMonError {
    fn from(value: LoginError) -> Self {
        Self::Auth(value.to_string())
    }
}

/// Interactive login: surfaces a QR URL and waits for it to be confirmed
/// on a phone.
#[derive(Debug)]
pub struct QrLoginFlow {
    api: Arc<BiliApi>,
    poll_interval: Duration,
    timeout: Duration,
}

impl QrLoginFlow {
    /// Flow with the configured poll interval and timeout.
    pub fn new(api: Arc<BiliApi>, config: &LoginConfig) -> Self {
        Self {
            api,
            poll_interval: Duration::from_millis(config.poll_interval_millis),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn generate(&self) -> std::result::Result<(String, String), LoginError> {
        let envelope =
            self.api.qr_generate().await.map_err(|e| LoginError::Generate(e.to_string()))?;
        if envelope.code != CODE_OK {
            return Err(LoginError::Generate(format!(
                "remote code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let field = |name: &str| {
            envelope
                .data
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| LoginError::Generate(format!("response has no {name}")))
        };
        Ok((field("url")?, field("qrcode_key")?))
    }

    async fn wait_for_confirmation(
        &self,
        qrcode_key: &str,
    ) -> std::result::Result<CredentialBag, LoginError> {
        let deadline = Instant::now() + self.timeout;
        let mut scanned_logged = false;

        loop {
            match self.api.qr_poll(qrcode_key).await {
                Ok(envelope) if envelope.code == CODE_OK => {
                    let (state, message) = poll_state(&envelope);
                    match state {
                        QR_CODE_SUCCESS => return tokens_from_success(&envelope),
                        QR_CODE_EXPIRED => return Err(LoginError::Expired),
                        QR_CODE_SCANNED => {
                            if !scanned_logged {
                                info!("QR code scanned, waiting for confirmation");
                                scanned_logged = true;
                            }
                        }
                        QR_CODE_NOT_SCANNED => debug!("QR code not scanned yet"),
                        code => {
                            return Err(LoginError::Unexpected { code, message: message.into() })
                        }
                    }
                }
                Ok(envelope) => {
                    debug!(code = envelope.code, message = %envelope.message, "QR poll rejected");
                }
                Err(e) => warn!(error = %e, "QR poll failed"),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(LoginError::TimedOut(self.timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn poll_state(envelope: &Envelope) -> (i64, &str) {
    let code = envelope.data.get("code").and_then(serde_json::Value::as_i64).unwrap_or(-1);
    let message = envelope.data.get("message").and_then(serde_json::Value::as_str).unwrap_or("");
    (code, message)
}

fn tokens_from_success(envelope: &Envelope) -> std::result::Result<CredentialBag, LoginError> {
    let raw = envelope.data.get("url").and_then(serde_json::Value::as_str).unwrap_or("");
    let url = url::Url::parse(raw).map_err(|_| LoginError::NoTokens)?;

    let bag = CredentialBag::from_pairs(
        url.query_pairs()
            .filter(|(name, _)| !NON_TOKEN_PARAMS.contains(&name.as_ref()))
            .map(|(name, value)| (name.into_owned(), value.into_owned())),
    );

    if bag.is_empty() {
        Err(LoginError::NoTokens)
    } else {
        Ok(bag)
    }
}

#[async_trait]
impl LoginFlow for QrLoginFlow {
    #[instrument(skip(self))]
    async fn login(&self) -> Result<CredentialBag> {
        let (url, qrcode_key) = self.generate().await?;
        info!(qr_url = %url, "scan this QR code URL with the mobile app to log in");

        let bag = self.wait_for_confirmation(&qrcode_key).await?;
        info!(tokens = bag.len(), "QR login confirmed");

        // merged so cookies set by earlier responses (buvid3, b_nut) survive
        self.api.credentials().merge_tokens(&bag).await?;
        Ok(bag)
    }
}
