//! Integration tests for the retrying fetcher against a stub remote.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bilimon_domain::constants::{NAV_PATH, TICKET_COOKIE, TICKET_PATH};
use bilimon_domain::{PollTarget, RemoteFailure};
use bilimon_infra::bili::RetryableFetcher;
use serde_json::{json, Value};
use support::{envelope, init_test_logger, mount_nav, TestEnv, T0};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

const STAT_PATH: &str = "/x/relation/stat";

fn follower_stat() -> bilimon_domain::PollRequest {
    PollTarget::FollowerStat { mid: 2 }.request()
}

/// Answers with `body` and fires `cancel`, as if shutdown arrived while
/// the response was in flight.
struct CancelWhileResponding {
    cancel: CancellationToken,
    body: String,
}

impl Respond for CancelWhileResponding {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.cancel.cancel();
        ResponseTemplate::new(200).set_body_string(self.body.clone())
    }
}

#[tokio::test]
async fn signed_fetch_returns_body_unchanged() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    let body = envelope(0, json!({ "mid": 2, "following": 10, "follower": 12345 }));
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .and(query_param("vmid", "2"))
        .and(query_param("wts", T0.to_string()))
        .and(query_param("w_rid", "6044c8206bfe4e91574276e112c4d454"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let payload = fetcher.fetch(&follower_stat(), &CancellationToken::new()).await.unwrap();

    assert_eq!(payload, serde_json::from_str::<Value>(&body).unwrap());
}

#[tokio::test]
async fn signature_rejection_refreshes_keys_once_then_surfaces() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-352, Value::Null)))
        .expect(2)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let result = fetcher.fetch(&follower_stat(), &CancellationToken::new()).await;

    assert_eq!(result, Err(RemoteFailure::SignatureRejected));
    // initial key fetch plus exactly one forced refresh
    assert_eq!(env.hits(NAV_PATH).await.len(), 2);
    assert_eq!(env.auth.keys().generation(), 2);
}

#[tokio::test]
async fn signature_rejection_recovers_after_refresh() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-352, Value::Null)))
        .up_to_n_times(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(envelope(0, json!({ "follower": 1 }))),
        )
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let payload = fetcher.fetch(&follower_stat(), &CancellationToken::new()).await.unwrap();

    assert_eq!(payload["data"]["follower"], 1);
    let stat_hits = env.hits(STAT_PATH).await;
    assert_eq!(stat_hits.len(), 2);
    assert!(stat_hits.iter().all(|r| r.url.query().unwrap_or("").contains("w_rid=")));
}

#[tokio::test]
async fn auth_denied_mints_ticket_and_retries_same_query() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    Mock::given(method("POST"))
        .and(path(TICKET_PATH))
        .and(query_param("key_id", "ec02"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(envelope(0, json!({ "ticket": "TKT" }))),
        )
        .expect(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-403, Value::Null)))
        .up_to_n_times(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(envelope(0, json!({ "follower": 7 }))),
        )
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let payload = fetcher.fetch(&follower_stat(), &CancellationToken::new()).await.unwrap();

    assert_eq!(payload["data"]["follower"], 7);
    assert_eq!(env.auth.credentials().snapshot().get(TICKET_COOKIE), Some("TKT"));

    let stat_hits = env.hits(STAT_PATH).await;
    assert_eq!(stat_hits.len(), 2);
    assert_eq!(stat_hits[0].url.query(), stat_hits[1].url.query());
    let cookie = stat_hits[1].headers.get("cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("bili_ticket=TKT"));
}

#[tokio::test]
async fn auth_denied_twice_surfaces_after_one_mint() {
    let env = TestEnv::new().await;
    Mock::given(method("POST"))
        .and(path(TICKET_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(envelope(0, json!({ "ticket": "TKT" }))),
        )
        .expect(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-403, Value::Null)))
        .expect(2)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let request = PollTarget::VideoStat { bvid: "BV1xx411c7mD".into() }.request();
    let result = fetcher.fetch(&request, &CancellationToken::new()).await;

    assert_eq!(result, Err(RemoteFailure::AuthDenied));
}

#[tokio::test]
async fn not_found_is_never_retried() {
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .and(query_param("bvid", "gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>404</html>"))
        .expect(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .and(query_param("bvid", "deleted"))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-404, Value::Null)))
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let cancel = CancellationToken::new();
    for bvid in ["gone", "deleted"] {
        let request = PollTarget::VideoStat { bvid: bvid.into() }.request();
        assert_eq!(fetcher.fetch(&request, &cancel).await, Err(RemoteFailure::NotFound));
    }
}

#[tokio::test]
async fn unknown_code_is_surfaced_and_logged_with_body() {
    let logs = init_test_logger();
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"code":-799,"message":"request too frequent","marker":"unknown-code-body"}"#,
        ))
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let request = PollTarget::VideoStat { bvid: "BV1".into() }.request();
    let result = fetcher.fetch(&request, &CancellationToken::new()).await;

    assert_eq!(
        result,
        Err(RemoteFailure::Unknown { code: -799, message: "request too frequent".into() })
    );
    assert!(logs.contains("unknown-code-body"), "raw body should be logged");
}

#[tokio::test]
async fn timeout_is_transport_failure_without_retry() {
    let env = TestEnv::with_timeout_secs(1).await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(envelope(0, Value::Null))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let request = PollTarget::VideoStat { bvid: "BV1".into() }.request();
    let result = fetcher.fetch(&request, &CancellationToken::new()).await;

    assert!(
        matches!(&result, Err(RemoteFailure::Transport { detail }) if detail.contains("timed out")),
        "got {result:?}"
    );
}

#[tokio::test]
async fn cancelled_fetch_issues_no_request() {
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(0, Value::Null)))
        .expect(0)
        .mount(&env.server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let request = PollTarget::VideoStat { bvid: "BV1".into() }.request();

    assert_eq!(fetcher.fetch(&request, &cancel).await, Err(RemoteFailure::Cancelled));
}

#[tokio::test]
async fn unavailable_keys_fall_back_to_unsigned() {
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .and(path(NAV_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-101, Value::Null)))
        .mount(&env.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TICKET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-400, Value::Null)))
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(envelope(0, json!({ "follower": 3 }))),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let payload = fetcher.fetch(&follower_stat(), &CancellationToken::new()).await.unwrap();

    assert_eq!(payload["data"]["follower"], 3);
    let stat_hits = env.hits(STAT_PATH).await;
    assert_eq!(stat_hits[0].url.query(), Some("vmid=2"));
    // the ticket was rejected, so nav was not asked again
    assert_eq!(env.hits(NAV_PATH).await.len(), 1);
}

#[tokio::test]
async fn unsigned_request_does_not_refresh_keys() {
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .and(path("/x/player/online/total"))
        .respond_with(ResponseTemplate::new(200).set_body_string(envelope(-352, Value::Null)))
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let request = PollTarget::VideoOnline { bvid: "BV1".into(), cid: 5 }.request();

    assert_eq!(
        fetcher.fetch(&request, &CancellationToken::new()).await,
        Err(RemoteFailure::SignatureRejected)
    );
    assert!(env.hits(NAV_PATH).await.is_empty());
}

#[tokio::test]
async fn key_cache_respects_ttl_boundary() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    let keys = env.auth.keys();

    let first = keys.get(false).await.unwrap();
    assert_eq!(first.keys.fetched_at, i64::try_from(T0).unwrap());

    env.clock.advance(Duration::from_secs(3599));
    assert_eq!(keys.get(false).await.unwrap(), first);
    assert_eq!(env.hits(NAV_PATH).await.len(), 1);

    env.clock.advance(Duration::from_secs(2));
    let refreshed = keys.get(false).await.unwrap();
    assert_eq!(env.hits(NAV_PATH).await.len(), 2);
    assert_eq!(refreshed.keys.fetched_at, i64::try_from(T0).unwrap() + 3601);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signature_failures_share_one_refresh() {
    let env = TestEnv::new().await;
    Mock::given(method("GET"))
        .and(path(NAV_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(support::nav_body())
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&env.server)
        .await;

    let observed = env.auth.keys().get(false).await.unwrap().generation;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&env.auth);
        handles.push(tokio::spawn(async move { auth.keys().force_refresh(observed).await }));
    }
    for handle in handles {
        let keys = handle.await.unwrap().unwrap();
        assert_eq!(keys.generation, observed + 1);
    }

    assert_eq!(env.hits(NAV_PATH).await.len(), 2);
}

#[tokio::test]
async fn cancellation_during_response_skips_key_refresh() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    let cancel = CancellationToken::new();
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(CancelWhileResponding {
            cancel: cancel.clone(),
            body: envelope(-352, Value::Null),
        })
        .expect(1)
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let result = fetcher.fetch(&follower_stat(), &cancel).await;

    assert_eq!(result, Err(RemoteFailure::Cancelled));
    // only the initial key fetch; no forced refresh after cancellation
    assert_eq!(env.hits(NAV_PATH).await.len(), 1);
    assert_eq!(env.auth.keys().generation(), 1);
}

#[tokio::test]
async fn cancellation_during_response_skips_ticket_mint() {
    let env = TestEnv::new().await;
    mount_nav(&env.server).await;
    let cancel = CancellationToken::new();
    Mock::given(method("GET"))
        .and(path(STAT_PATH))
        .respond_with(CancelWhileResponding {
            cancel: cancel.clone(),
            body: envelope(-403, Value::Null),
        })
        .mount(&env.server)
        .await;

    let fetcher = RetryableFetcher::new(Arc::clone(&env.auth));
    let result = fetcher.fetch(&follower_stat(), &cancel).await;

    assert_eq!(result, Err(RemoteFailure::Cancelled));
    assert!(env.hits(TICKET_PATH).await.is_empty());
}
