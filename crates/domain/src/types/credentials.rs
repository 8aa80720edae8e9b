//! Session token bag ("cookies") and its persisted form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::CSRF_COOKIE;

/// Mapping of token name to token value used to authenticate requests.
///
/// Ordered so the rendered `Cookie` header is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBag {
    tokens: BTreeMap<String, String>,
}

impl CredentialBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat `name=value; name2=value2` cookie string.
    ///
    /// Newlines are accepted as separators as well, so a cookie file with
    /// one pair per line parses the same way. Fragments without `=` or with
    /// an empty name are skipped.
    pub fn parse_cookie_string(raw: &str) -> Self {
        let tokens = raw
            .split([';', '\n'])
            .filter_map(|fragment| {
                let (name, value) = fragment.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { tokens }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { tokens: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(name.into(), value.into());
    }

    /// Overwrite or add every token from `other`.
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in &other.tokens {
            self.tokens.insert(name.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// The CSRF token (`bili_jct`), required by the ticket endpoint.
    pub fn csrf(&self) -> Option<&str> {
        self.get(CSRF_COOKIE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as a `Cookie` request header value.
    pub fn to_cookie_header(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; ")
    }

    /// Snapshot for the persisted session file.
    pub fn to_persisted(&self, saved_at: i64) -> PersistedSession {
        PersistedSession {
            cookies: self
                .iter()
                .map(|(name, value)| CookiePair { name: name.to_string(), value: value.to_string() })
                .collect(),
            time: saved_at,
        }
    }
}

/// One `{name, value}` entry of a persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
}

/// On-disk session: the token pairs plus the unix time they were saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub cookies: Vec<CookiePair>,
    /// Unix seconds; older files carry a float or a local date string.
    #[serde(default, deserialize_with = "crate::types::timestamp::unix_seconds")]
    pub time: i64,
}

impl PersistedSession {
    pub fn into_bag(self) -> CredentialBag {
        CredentialBag::from_pairs(self.cookies.into_iter().map(|pair| (pair.name, pair.value)))
    }
}
