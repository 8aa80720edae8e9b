//! WBI request signing.
//!
//! Signing steps, all deterministic for a fixed `wts`:
//! 1. inject `wts` (unix seconds)
//! 2. order parameters by key, byte-wise
//! 3. strip `!'()*` from every value
//! 4. derive the 32-char mixin key from `img_key + sub_key` through
//!    [`MIXIN_KEY_ENC_TAB`]
//! 5. percent-encode into the canonical query string
//! 6. `w_rid = md5(query + mixin)` as lowercase hex
//!
//! The request must be sent with exactly the query string produced here
//! ([`SignedParams::to_query_string`]); re-encoding the parameters with a
//! different encoder invalidates the digest.

use std::collections::BTreeMap;
use std::sync::Arc;

use bilimon_common::Clock;
use bilimon_domain::constants::{
    MIXIN_KEY_ENC_TAB, MIXIN_KEY_LEN, PARAM_WTS, PARAM_W_RID, SIGN_SANITIZE_CHARS,
};
use bilimon_domain::SignedKeyPair;
use md5::{Digest, Md5};
use thiserror::Error;

/// Why a parameter set could not be signed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    /// `img_key + sub_key` is too short for the permutation table.
    #[error("signing keys too short: need at least {needed} chars, got {actual}")]
    KeyTooShort { needed: usize, actual: usize },

    /// The digest primitive rejected its input.
    #[error("digest error: {0}")]
    Digest(String),
}

/// Derive the mixin key from a key pair.
///
/// # Errors
///
/// Returns [`SignError::KeyTooShort`] when the concatenated keys do not
/// cover every index the first 32 table entries refer to.
pub fn mixin_key(img_key: &str, sub_key: &str) -> Result<String, SignError> {
    let raw: Vec<char> = img_key.chars().chain(sub_key.chars()).collect();
    let needed = MIXIN_KEY_ENC_TAB[..MIXIN_KEY_LEN].iter().max().map_or(0, |max| max + 1);
    if raw.len() < needed {
        return Err(SignError::KeyTooShort { needed, actual: raw.len() });
    }
    Ok(MIXIN_KEY_ENC_TAB[..MIXIN_KEY_LEN].iter().map(|&i| raw[i]).collect())
}

/// Remove the characters the platform strips before verifying.
pub fn sanitize_value(value: &str) -> String {
    value.chars().filter(|c| !SIGN_SANITIZE_CHARS.contains(c)).collect()
}

/// Percent-encode an ordered parameter set as `k=v&k2=v2`.
///
/// Spaces become `%20`. Used for signed and unsigned requests alike so
/// both go out with the same encoding.
pub fn encode_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parameter set carrying `wts` and `w_rid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParams {
    params: BTreeMap<String, String>,
    canonical_query: String,
    wts: i64,
    w_rid: String,
}

impl SignedParams {
    /// Sign `params` with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`mixin_key`].
    pub fn sign_at(
        params: &BTreeMap<String, String>,
        keys: &SignedKeyPair,
        wts: i64,
    ) -> Result<Self, SignError> {
        let mixin = mixin_key(&keys.img_key, &keys.sub_key)?;

        let mut sanitized: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.as_str() != PARAM_W_RID)
            .map(|(k, v)| (k.clone(), sanitize_value(v)))
            .collect();
        sanitized.insert(PARAM_WTS.to_string(), wts.to_string());

        let canonical_query = encode_query(&sanitized);
        let w_rid = hex::encode(Md5::digest(format!("{canonical_query}{mixin}").as_bytes()));

        sanitized.insert(PARAM_W_RID.to_string(), w_rid.clone());
        Ok(Self { params: sanitized, canonical_query, wts, w_rid })
    }

    /// Sanitized parameters including `wts` and `w_rid`.
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Timestamp that was signed.
    pub const fn wts(&self) -> i64 {
        self.wts
    }

    /// Lowercase hex MD5 signature.
    pub fn w_rid(&self) -> &str {
        &self.w_rid
    }

    /// The string that was digested (everything but `w_rid`).
    pub fn canonical_query(&self) -> &str {
        &self.canonical_query
    }

    /// Query string to send: the canonical query followed by `w_rid`.
    pub fn to_query_string(&self) -> String {
        format!("{}&{PARAM_W_RID}={}", self.canonical_query, self.w_rid)
    }
}

/// Signs parameter sets with timestamps from an injected clock.
#[derive(Clone)]
pub struct WbiSigner {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WbiSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WbiSigner").finish_non_exhaustive()
    }
}

impl WbiSigner {
    /// Signer taking `wts` from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// # Errors
    ///
    /// See [`mixin_key`].
    pub fn sign(
        &self,
        params: &BTreeMap<String, String>,
        keys: &SignedKeyPair,
    ) -> Result<SignedParams, SignError> {
        SignedParams::sign_at(params, keys, self.clock.unix_seconds())
    }
}
