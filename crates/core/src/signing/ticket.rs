//! Ticket digest.

use bilimon_domain::constants::TICKET_HMAC_SECRET;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::wbi::SignError;

type HmacSha256 = Hmac<Sha256>;

/// `hexsign` for the ticket endpoint: lowercase hex
/// HMAC-SHA256(secret, "ts" + unix seconds).
///
/// # Errors
///
/// [`SignError::Digest`] if the MAC cannot be keyed.
pub fn ticket_hexsign(ts: i64) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(TICKET_HMAC_SECRET.as_bytes())
        .map_err(|e| SignError::Digest(e.to_string()))?;
    mac.update(format!("ts{ts}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
