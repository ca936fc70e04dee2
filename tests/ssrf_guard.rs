//! Target validation, caller admission and rate limiting.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    routing::get,
    Router,
};
use serde_json::json;

mod common;
use common::{start_relay, start_upstream, test_config, upstream_url, BASE_ORIGIN};

fn error_of(reply: &serde_json::Value) -> &str {
    reply["error"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn loopback_and_metadata_targets_are_refused() {
    let relay = start_relay(test_config()).await;

    for url in [
        "http://127.0.0.1/admin",
        "http://[::1]:8080/",
        "http://169.254.169.254/latest/meta-data/",
        "http://[::ffff:10.0.0.1]/",
    ] {
        let (status, reply) = relay.relay_json(json!({"url": url})).await;
        assert_eq!(status, 400, "{url}");
        assert!(error_of(&reply).contains("private"), "{url}: {reply}");
    }

    let (status, reply) = relay
        .relay_json(json!({"url": "http://metadata.google.internal/computeMetadata/v1/"}))
        .await;
    assert_eq!(status, 400);
    assert!(error_of(&reply).contains("Blocked hostname"));
}

#[tokio::test]
async fn hostname_resolving_private_is_refused() {
    let relay = start_relay(test_config()).await;

    let (status, reply) = relay
        .relay_json(json!({"url": "http://internal.test/secrets"}))
        .await;
    assert_eq!(status, 400);
    assert!(error_of(&reply).contains("private"));
}

#[tokio::test]
async fn unresolvable_host_fails_closed() {
    let relay = start_relay(test_config()).await;

    let (status, reply) = relay
        .relay_json(json!({"url": "http://nowhere.test/"}))
        .await;
    assert_eq!(status, 400);
    assert!(error_of(&reply).contains("DNS resolution failed"));
}

#[tokio::test]
async fn redirect_into_private_space_is_blocked_before_contact() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let up = start_upstream(
        Router::new()
            .route(
                "/to-internal",
                get(|| async { (StatusCode::FOUND, [(header::LOCATION, "http://internal.test/x")]) }),
            )
            .route(
                "/to-loopback",
                get(|| async {
                    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "http://127.0.0.1:1/")])
                }),
            )
            .route(
                "/to-file",
                get(|| async { (StatusCode::FOUND, [(header::LOCATION, "file:///etc/passwd")]) }),
            )
            .route(
                "/x",
                get(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { "reached" }
                }),
            ),
    )
    .await;
    let relay = start_relay(test_config()).await;

    for path in ["/to-internal", "/to-loopback"] {
        let (status, reply) = relay
            .relay_json(json!({"url": upstream_url("api.test", up, path)}))
            .await;
        assert_eq!(status, 400, "{path}");
        let msg = error_of(&reply);
        assert!(msg.starts_with("Redirect blocked (hop 1)"), "{msg}");
        assert!(msg.contains("private"), "{msg}");
    }

    let (status, reply) = relay
        .relay_json(json!({"url": upstream_url("api.test", up, "/to-file")}))
        .await;
    assert_eq!(status, 400);
    assert!(error_of(&reply).starts_with("Redirect blocked"));

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn allowlist_limits_targets_and_redirects() {
    let up = start_upstream(Router::new().route("/ok", get(|| async { "fine" }))).await;
    let mut config = test_config();
    config.relay.allowed_domains = vec!["api.test".to_string()];
    let relay = start_relay(config).await;

    let (status, _) = relay
        .relay_json(json!({"url": upstream_url("api.test", up, "/ok")}))
        .await;
    assert_eq!(status, 200);

    let (status, reply) = relay
        .relay_json(json!({"url": upstream_url("other.test", up, "/ok")}))
        .await;
    assert_eq!(status, 400);
    assert!(error_of(&reply).contains("not in the allowed domains"));
}

#[tokio::test]
async fn reloaded_configuration_applies_to_the_next_call() {
    let up = start_upstream(Router::new().route("/ok", get(|| async { "fine" }))).await;
    let relay = start_relay(test_config()).await;
    let url = upstream_url("other.test", up, "/ok");

    let (status, _) = relay.relay_json(json!({"url": url})).await;
    assert_eq!(status, 200);

    let mut restricted = test_config();
    restricted.relay.allowed_domains = vec!["api.test".to_string()];
    relay.config_tx.send(restricted).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, _) = relay.relay_json(json!({"url": url})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn invalid_payloads_name_the_field() {
    let relay = start_relay(test_config()).await;

    let cases = [
        (json!({"method": "GET"}), "url"),
        (json!({"url": "ftp://example.com/"}), "url"),
        (json!({"url": "https://example.com", "method": "TRACE"}), "method"),
        (json!({"url": "https://example.com", "timeoutMs": 60_000}), "timeoutMs"),
        (
            json!({"url": "https://example.com", "auth": {"type": "oauth", "credentials": "x"}}),
            "auth.type",
        ),
        (
            json!({"url": "https://example.com", "auth": {"type": "bearer"}}),
            "auth.credentials",
        ),
        (
            json!({
                "url": "https://example.com",
                "auth": {"type": "api-key", "credentials": "x", "headerName": "Authorization"}
            }),
            "auth.headerName",
        ),
    ];

    for (payload, field) in cases {
        let (status, reply) = relay.relay_json(payload.clone()).await;
        assert_eq!(status, 400, "{payload}");
        assert!(
            error_of(&reply).contains(&format!("'{field}'")),
            "{payload}: {reply}"
        );
    }
}

#[tokio::test]
async fn non_json_body_is_a_body_error() {
    let relay = start_relay(test_config()).await;

    let response = reqwest::Client::new()
        .post(relay.url("/api/relay"))
        .header("origin", BASE_ORIGIN)
        .header("content-type", "application/json")
        .body("{oops")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let reply: serde_json::Value = response.json().await.unwrap();
    assert!(error_of(&reply).contains("'body'"));
}

#[tokio::test]
async fn foreign_callers_are_turned_away() {
    let relay = start_relay(test_config()).await;
    let client = reqwest::Client::new();
    let payload = json!({"url": "https://example.com"});

    let response = client
        .post(relay.url("/api/relay"))
        .header("origin", "https://evil.example")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .post(relay.url("/api/relay"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .post(relay.url("/api/relay"))
        .header("origin", BASE_ORIGIN)
        .header("content-type", "text/plain")
        .body(payload.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .post(relay.url("/api/relay"))
        .header("referer", format!("{BASE_ORIGIN}/pages/abc"))
        .json(&json!({"url": "http://127.0.0.1/"}))
        .send()
        .await
        .unwrap();
    // admitted, then refused as a private target
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn oversized_request_is_rejected() {
    let mut config = test_config();
    config.relay.max_request_bytes = 256;
    let relay = start_relay(config).await;

    let (status, _) = relay
        .relay_json(json!({"url": "https://example.com", "body": "z".repeat(1024)}))
        .await;
    assert_eq!(status, 413);
}

#[tokio::test]
async fn rate_limit_rejects_after_budget() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let relay = start_relay(config).await;
    let payload = json!({"url": "http://127.0.0.1/"});

    for remaining in ["1", "0"] {
        let response = relay.relay(payload.clone()).await;
        assert_eq!(response.status(), 400);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
    }

    let response = relay.relay(payload).await;
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    // health is not rate limited
    let response = reqwest::get(relay.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
}
