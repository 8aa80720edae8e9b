//! Signing key pair fetched from the navigation endpoint.

use serde::{Deserialize, Serialize};

/// `img_key` / `sub_key` plus the unix time they were fetched.
///
/// Serialized as `{img_key, sub_key, time}`, the persisted key-cache
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedKeyPair {
    pub img_key: String,
    pub sub_key: String,
    #[serde(
        rename = "time",
        default,
        deserialize_with = "crate::types::timestamp::unix_seconds"
    )]
    pub fetched_at: i64,
}

impl SignedKeyPair {
    pub fn new(img_key: impl Into<String>, sub_key: impl Into<String>, fetched_at: i64) -> Self {
        Self { img_key: img_key.into(), sub_key: sub_key.into(), fetched_at }
    }

    /// Build a pair from the two `wbi_img` URLs returned by the
    /// navigation endpoint.
    ///
    /// Returns `None` when either URL has no usable file stem.
    pub fn from_urls(img_url: &str, sub_url: &str, fetched_at: i64) -> Option<Self> {
        Some(Self::new(key_from_url(img_url)?, key_from_url(sub_url)?, fetched_at))
    }

    /// Seconds since the pair was fetched.
    pub const fn age_secs(&self, now: i64) -> i64 {
        now - self.fetched_at
    }

    /// `true` while the pair is younger than `ttl_secs`.
    pub const fn is_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        self.age_secs(now) < ttl_secs
    }
}

/// Last path segment of `url` with its extension removed:
/// `https://i0.hdslb.com/bfs/wbi/7cd0....png` -> `7cd0...`.
pub fn key_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
