#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use bilimon_common::testing::MockClock;
use bilimon_common::Clock;
use bilimon_core::RecordSink;
use bilimon_domain::constants::NAV_PATH;
use bilimon_domain::{Config, FetchedRecord, Result};
use bilimon_infra::auth::SharedAuthContext;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const IMG_URL: &str = "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png";
pub const SUB_URL: &str = "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png";

/// Unix time every [`TestEnv`] clock starts at.
pub const T0: u64 = 1_700_000_000;

/// Stub remote plus an auth context wired to it. Credential and key files
/// live in a temporary directory kept alive with the env.
pub struct TestEnv {
    pub server: MockServer,
    pub clock: Arc<MockClock>,
    pub config: Config,
    pub auth: Arc<SharedAuthContext>,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_timeout_secs(5).await
    }

    pub async fn with_timeout_secs(timeout_secs: u64) -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().expect("temp dir should be created");
        let clock = Arc::new(MockClock::at_unix(T0));

        let mut config = Config::default();
        config.http.api_base = server.uri();
        config.http.passport_base = server.uri();
        config.http.timeout_secs = timeout_secs;
        config.credentials.cookie_file = dir.path().join("cookie.txt");
        config.credentials.session_file = dir.path().join("bili_cookies.json");
        config.credentials.key_cache_file = dir.path().join("wbi_keys.json");
        config.sink.output_dir = dir.path().join("data");

        let shared_clock: Arc<dyn Clock> = clock.clone();
        let auth = SharedAuthContext::from_config(&config, shared_clock)
            .expect("auth context should build");

        Self { server, clock, config, auth: Arc::new(auth), _dir: dir }
    }

    /// Requests the stub received on `request_path`.
    pub async fn hits(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }
}

/// `{code, message, data}` body.
pub fn envelope(code: i64, data: serde_json::Value) -> String {
    serde_json::json!({ "code": code, "message": code.to_string(), "ttl": 1, "data": data })
        .to_string()
}

pub fn nav_body() -> String {
    envelope(-101, serde_json::json!({ "isLogin": false, "wbi_img": { "img_url": IMG_URL, "sub_url": SUB_URL } }))
}

/// Mount a nav endpoint serving the reference keys.
pub async fn mount_nav(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(NAV_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(nav_body()))
        .mount(server)
        .await;
}

/// Sink that keeps every record in memory.
#[derive(Default)]
pub struct RecordingSink {
    records: parking_lot::Mutex<Vec<FetchedRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<FetchedRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn write(&self, record: &FetchedRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Handle for inspecting captured log output during tests.
pub struct LogHandle {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogHandle {
    /// Everything logged so far by every test in this binary.
    pub fn output(&self) -> String {
        let guard = self.buffer.lock().expect("log mutex poisoned");
        String::from_utf8_lossy(&guard).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.output().contains(needle)
    }
}

#[derive(Clone)]
struct BufferWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.buffer.lock().expect("log mutex poisoned");
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

static LOG_BUFFER: OnceLock<Arc<Mutex<Vec<u8>>>> = OnceLock::new();

/// Install a capturing tracing subscriber (idempotent) and obtain a handle
/// for reading log output.
pub fn init_test_logger() -> LogHandle {
    let buffer = LOG_BUFFER.get_or_init(|| {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = BufferWriter { buffer: Arc::clone(&buffer) };
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .try_init();
        buffer
    });

    LogHandle { buffer: Arc::clone(buffer) }
}
