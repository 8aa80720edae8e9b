//! Signing-key cache.
//!
//! Lookup order on [`SignedKeyCache::get`]: fresh in-memory pair, fresh
//! persisted pair, then the remote [`KeySource`]. Refreshes go through a
//! [`RefreshGate`], so N tasks hitting a rejected signature at once cause
//! one remote fetch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bilimon_common::{Clock, RefreshGate, RefreshOutcome};
use bilimon_domain::constants::SIGNED_KEY_TTL_SECS;
use bilimon_domain::{Envelope, SignedKeyPair};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::auth::TicketGenerator;
use crate::bili::BiliApi;
use crate::storage::{read_json_if_exists, write_json_atomic};

/// Why no key pair could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyCacheError {
    /// No usable key pair could be obtained. Callers decide whether to send
    /// unsigned or give up.
    #[error("signing keys unavailable: {0}")]
    Unavailable(String),
}

/// Where fresh key pairs come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<SignedKeyPair, KeyCacheError>;
}

/// Reads keys from the navigation endpoint.
///
/// Logged-out sessions still receive `wbi_img`, so keys are taken whenever
/// present regardless of the code. When they are missing a ticket is
/// minted and the call retried once.
pub struct NavKeySource {
    api: Arc<BiliApi>,
    tickets: Arc<TicketGenerator>,
    clock: Arc<dyn Clock>,
}

impl NavKeySource {
    /// Source reading nav through `api`, minting tickets via `tickets`.
    pub fn new(api: Arc<BiliApi>, tickets: Arc<TicketGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { api, tickets, clock }
    }

    async fn try_nav(&self) -> Result<Option<SignedKeyPair>, KeyCacheError> {
        let envelope =
            self.api.nav().await.map_err(|e| KeyCacheError::Unavailable(e.to_string()))?;
        let keys = keys_from_nav(&envelope, self.clock.unix_seconds());
        if keys.is_none() {
            debug!(code = envelope.code, message = %envelope.message, "nav response has no keys");
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for NavKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavKeySource").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeySource for NavKeySource {
    #[instrument(skip(self))]
    async fn fetch_keys(&self) -> Result<SignedKeyPair, KeyCacheError> {
        if let Some(keys) = self.try_nav().await? {
            return Ok(keys);
        }

        let observed = self.tickets.generation();
        self.tickets.mint_after(observed).await.map_err(|e| {
            KeyCacheError::Unavailable(format!("nav carried no keys and {e}"))
        })?;

        self.try_nav()
            .await?
            .ok_or_else(|| KeyCacheError::Unavailable("nav carried no keys after ticket".into()))
    }
}

fn keys_from_nav(envelope: &Envelope, now: i64) -> Option<SignedKeyPair> {
    let wbi = envelope.data.get("wbi_img")?;
    let img_url = wbi.get("img_url")?.as_str()?;
    let sub_url = wbi.get("sub_url")?.as_str()?;
    SignedKeyPair::from_urls(img_url, sub_url, now)
}

/// A key pair plus the cache generation it was produced at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle {
    pub keys: Arc<SignedKeyPair>,
    /// Refresh generation; pass back to `force_refresh` to coalesce callers.
    pub generation: u64,
}

/// Shared WBI key pair with TTL, file persistence and single-flight
/// refresh.
pub struct SignedKeyCache {
    source: Arc<dyn KeySource>,
    clock: Arc<dyn Clock>,
    path: PathBuf,
    ttl_secs: i64,
    current: RwLock<Option<KeyHandle>>,
    gate: RefreshGate,
}

impl std::fmt::Debug for SignedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedKeyCache")
            .field("path", &self.path)
            .field("ttl_secs", &self.ttl_secs)
            .field("generation", &self.gate.generation())
            .finish_non_exhaustive()
    }
}

impl SignedKeyCache {
    /// Empty cache with the default TTL, persisting to `path`.
    pub fn new(source: Arc<dyn KeySource>, clock: Arc<dyn Clock>, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            clock,
            path: path.into(),
            ttl_secs: SIGNED_KEY_TTL_SECS,
            current: RwLock::new(None),
            gate: RefreshGate::new(),
        }
    }

    /// Override the key TTL.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Number of completed refreshes.
    pub fn generation(&self) -> u64 {
        self.gate.generation()
    }

    /// Current pair, refreshing when stale or when `force` is set.
    ///
    /// # Errors
    ///
    /// [`KeyCacheError::Unavailable`] when no fresh pair can be found.
    pub async fn get(&self, force: bool) -> Result<KeyHandle, KeyCacheError> {
        let observed = self.gate.generation();
        if !force {
            if let Some(handle) = self.fresh_in_memory() {
                return Ok(handle);
            }
        }
        self.refresh(observed, force).await
    }

    /// Fetch a new pair from the source unless someone already refreshed
    /// past `observed`, in which case the newer pair is returned.
    ///
    /// # Errors
    ///
    /// See [`SignedKeyCache::get`].
    pub async fn force_refresh(&self, observed: u64) -> Result<KeyHandle, KeyCacheError> {
        self.refresh(observed, true).await
    }

    fn fresh_in_memory(&self) -> Option<KeyHandle> {
        let now = self.clock.unix_seconds();
        self.current.read().as_ref().filter(|h| h.keys.is_fresh(now, self.ttl_secs)).cloned()
    }

    #[instrument(skip(self))]
    async fn refresh(&self, observed: u64, force: bool) -> Result<KeyHandle, KeyCacheError> {
        let outcome = self
            .gate
            .refresh(observed, || async {
                let persisted = if force { None } else { self.load_persisted().await };
                let keys = match persisted {
                    Some(keys) => keys,
                    None => {
                        let keys = self.source.fetch_keys().await?;
                        info!(fetched_at = keys.fetched_at, "fetched new signing keys");
                        self.persist(&keys).await;
                        keys
                    }
                };

                let handle = KeyHandle { keys: Arc::new(keys), generation: observed + 1 };
                *self.current.write() = Some(handle.clone());
                Ok::<_, KeyCacheError>(handle)
            })
            .await;

        match outcome {
            Ok(RefreshOutcome::Refreshed { value, .. }) => Ok(value),
            Ok(RefreshOutcome::Coalesced { generation }) => {
                debug!(generation, "key refresh coalesced");
                self.current.read().clone().ok_or_else(|| {
                    KeyCacheError::Unavailable("no keys after concurrent refresh".into())
                })
            }
            Err(e) => {
                warn!(error = %e, "signing key refresh failed");
                Err(e)
            }
        }
    }

    async fn load_persisted(&self) -> Option<SignedKeyPair> {
        match read_json_if_exists::<SignedKeyPair>(&self.path).await {
            Ok(Some(keys)) if keys.is_fresh(self.clock.unix_seconds(), self.ttl_secs) => {
                debug!(path = %self.path.display(), "adopted persisted signing keys");
                Some(keys)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable key cache");
                None
            }
        }
    }

    async fn persist(&self, keys: &SignedKeyPair) {
        if let Err(e) = write_json_atomic(&self.path, keys).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist signing keys");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bilimon_common::testing::MockClock;
    use tempfile::TempDir;

    use super::*;

    struct CountingSource {
        clock: Arc<MockClock>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(clock: Arc<MockClock>) -> Self {
            Self { clock, calls: AtomicUsize::new(0), delay: Duration::ZERO }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch_keys(&self) -> Result<SignedKeyPair, KeyCacheError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(SignedKeyPair::new(format!("img{n}"), format!("sub{n}"), self.clock.unix_seconds()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl KeySource for FailingSource {
        async fn fetch_keys(&self) -> Result<SignedKeyPair, KeyCacheError> {
            Err(KeyCacheError::Unavailable("nav down".into()))
        }
    }

    #[tokio::test]
    async fn reuses_memory_within_ttl_and_refetches_after() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let source = Arc::new(CountingSource::new(Arc::clone(&clock)));
        let cache = SignedKeyCache::new(source.clone(), clock.clone(), dir.path().join("k.json"));

        let first = cache.get(false).await.unwrap();
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get(false).await.unwrap(), first);
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::from_secs(2));
        let second = cache.get(false).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(second.keys.img_key, "img1");
        assert_eq!(second.generation, 2);
    }

    #[tokio::test]
    async fn adopts_fresh_persisted_pair() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json");
        std::fs::write(&path, r#"{"img_key":"disk_img","sub_key":"disk_sub","time":999000}"#)
            .unwrap();

        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let source = Arc::new(CountingSource::new(Arc::clone(&clock)));
        let cache = SignedKeyCache::new(source.clone(), clock, &path);

        let handle = cache.get(false).await.unwrap();

        assert_eq!(handle.keys.img_key, "disk_img");
        assert_eq!(handle.keys.fetched_at, 999_000);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn adopts_cache_file_with_float_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wbi_cache.json");
        std::fs::write(&path, r#"{"img_key": "py_img", "sub_key": "py_sub", "time": 999000.42}"#)
            .unwrap();

        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let source = Arc::new(CountingSource::new(Arc::clone(&clock)));
        let cache = SignedKeyCache::new(source.clone(), clock, &path);

        let handle = cache.get(false).await.unwrap();

        assert_eq!(handle.keys.img_key, "py_img");
        assert_eq!(handle.keys.fetched_at, 999_000);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn stale_persisted_pair_is_refetched_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json");
        std::fs::write(&path, r#"{"img_key":"old","sub_key":"old","time":1}"#).unwrap();

        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let source = Arc::new(CountingSource::new(Arc::clone(&clock)));
        let cache = SignedKeyCache::new(source.clone(), clock, &path);

        let handle = cache.get(false).await.unwrap();
        assert_eq!(handle.keys.img_key, "img0");

        let on_disk: SignedKeyPair =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, *handle.keys);
    }

    #[tokio::test]
    async fn force_skips_fresh_memory_and_disk() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let source = Arc::new(CountingSource::new(Arc::clone(&clock)));
        let cache = SignedKeyCache::new(source.clone(), clock, dir.path().join("k.json"));

        cache.get(false).await.unwrap();
        let forced = cache.get(true).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(forced.keys.img_key, "img1");
    }

    #[tokio::test]
    async fn source_failure_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let cache = SignedKeyCache::new(
            Arc::new(FailingSource),
            Arc::new(MockClock::at_unix(1)),
            dir.path().join("k.json"),
        );

        assert!(matches!(cache.get(false).await, Err(KeyCacheError::Unavailable(_))));
        assert_eq!(cache.generation(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_force_refresh_fetches_once() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(MockClock::at_unix(1_000_000));
        let mut source = CountingSource::new(Arc::clone(&clock));
        source.delay = Duration::from_millis(50);
        let source = Arc::new(source);
        let cache =
            Arc::new(SignedKeyCache::new(source.clone(), clock, dir.path().join("k.json")));

        let observed = cache.get(false).await.unwrap().generation;
        assert_eq!(source.calls(), 1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.force_refresh(observed).await }));
        }
        for handle in handles {
            let keys = handle.await.unwrap().unwrap();
            assert_eq!(keys.keys.img_key, "img1");
        }

        assert_eq!(source.calls(), 2);
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn nav_keys_are_taken_regardless_of_code() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"code":-101,"message":"not logged in","data":{"wbi_img":{
                "img_url":"https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png",
                "sub_url":"https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png"}}}"#,
        )
        .unwrap();

        let keys = keys_from_nav(&envelope, 5).unwrap();
        assert_eq!(keys.img_key, "7cd084941338484aae1ad9425b84077c");
        assert_eq!(keys.fetched_at, 5);

        let empty: Envelope = serde_json::from_str(r#"{"code":-101}"#).unwrap();
        assert!(keys_from_nav(&empty, 5).is_none());
    }
}
