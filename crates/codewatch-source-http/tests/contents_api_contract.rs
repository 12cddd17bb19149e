//! Contract Test: Contents API Adapter
//!
//! Runs the adapter against a local mock host.
//!
//! Constraints verified:
//! - One GET per fetch, with the token in the `Authorization` header
//! - Host rejections are configuration errors, server trouble is transient
//! - Payloads that do not decode are transient
//! - No retry inside the adapter

use base64::{Engine, engine::general_purpose::STANDARD};
use codewatch_core::config::{HostKind, SourceConfig, SourceSettings};
use codewatch_core::traits::{CodeRecord, FetchResult, SourceAdapter};
use codewatch_source_http::HttpSourceAdapter;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENTS_PATH: &str = "/repos/acme/codes/contents/code.json";

fn source(server: &MockServer, host: HostKind) -> SourceConfig {
    SourceSettings::new("acme/codes", "secret-token")
        .with_host(host)
        .with_api_base(server.uri())
        .resolve(host.as_str())
        .expect("valid source")
}

fn contents(document: serde_json::Value) -> serde_json::Value {
    json!({
        "name": "code.json",
        "encoding": "base64",
        "content": STANDARD.encode(document.to_string()),
    })
}

#[tokio::test]
async fn github_request_carries_token_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(header("authorization", "token secret-token"))
        .and(header("accept", "application/vnd.github.v3+json"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(contents(json!({"verifyCode": "123456", "date": "t1"}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    assert_eq!(result, FetchResult::Success(CodeRecord::new("123456", "t1")));
}

#[tokio::test]
async fn gitee_request_decodes_the_same_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(header("authorization", "token secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(contents(json!({"verifyCode": "654321", "date": "t3"}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Gitee)).await;

    assert_eq!(result, FetchResult::Success(CodeRecord::new("654321", "t3")));
}

#[tokio::test]
async fn unauthorized_is_a_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"message":"Bad credentials"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    let FetchResult::ConfigError(failure) = result else {
        panic!("expected a config error, got {:?}", result);
    };
    assert_eq!(failure.status, Some(401));
    assert!(failure.message.contains("Bad credentials"));
    assert!(!failure.to_string().contains("secret-token"));
}

#[tokio::test]
async fn missing_file_is_a_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Gitee)).await;

    assert!(matches!(result, FetchResult::ConfigError(ref f) if f.status == Some(404)));
}

#[tokio::test]
async fn server_errors_are_transient_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    let FetchResult::TransientFailure(failure) = result else {
        panic!("expected a transient failure, got {:?}", result);
    };
    assert_eq!(failure.status, Some(503));
    assert_eq!(failure.message, "maintenance");

    // Dropping the server verifies the `expect(1)` call counts
    drop(server);
}

#[tokio::test]
async fn rate_limiting_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    assert!(matches!(result, FetchResult::TransientFailure(ref f) if f.status == Some(429)));
}

#[tokio::test]
async fn undecodable_payload_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "encoding": "base64",
            "content": STANDARD.encode("{\"verifyCode\": \"12"),
        })))
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::new().unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    let FetchResult::TransientFailure(failure) = result else {
        panic!("expected a transient failure, got {:?}", result);
    };
    assert!(failure.message.starts_with("decode error"));
}

#[tokio::test]
async fn slow_host_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(contents(json!({"verifyCode": "123456", "date": "t1"})))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let adapter = HttpSourceAdapter::with_timeout(Duration::from_millis(200)).unwrap();
    let result = adapter.fetch(&source(&server, HostKind::Github)).await;

    let FetchResult::TransientFailure(failure) = result else {
        panic!("expected a transient failure, got {:?}", result);
    };
    assert!(failure.message.contains("timed out"));
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    let config = SourceSettings::new("acme/codes", "secret-token")
        .with_api_base("http://127.0.0.1:1")
        .resolve("github")
        .expect("valid source");

    let adapter = HttpSourceAdapter::with_timeout(Duration::from_secs(2)).unwrap();
    let result = adapter.fetch(&config).await;

    assert!(matches!(result, FetchResult::TransientFailure(ref f) if f.status.is_none()));
}
