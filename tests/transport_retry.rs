//! Integration tests for the transport retry policy against a mock server.
//!
//! Each test starts its own `MockServer`; `.expect(n)` pins the exact number
//! of attempts and is verified when the server drops.

mod common;

use common::{init_tracing, test_config};
use matchday::{Config, TransportClient, TransportError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> TransportClient {
    TransportClient::new(&test_config(&server.uri())).unwrap()
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_persistent_429_exhausts_budget() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get::<Value>("news", &[])
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::RateLimited { attempts: 4 });
}

#[tokio::test]
async fn test_429_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let body: Value = client_for(&server).get("news", &[]).await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_zero_retries_makes_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = TransportClient::new(&Config {
        max_retries: 0,
        ..test_config(&server.uri())
    })
    .unwrap();
    let err = client.get::<Value>("news", &[]).await.unwrap_err();
    assert_eq!(err, TransportError::RateLimited { attempts: 1 });
}

// ============================================================================
// Non-retryable statuses
// ============================================================================

#[tokio::test]
async fn test_401_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get::<Value>("news", &[])
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Auth);
}

#[tokio::test]
async fn test_500_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get::<Value>("news", &[])
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Server(500));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_schema_mismatch_is_decoding_error() {
    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Expected {
        data: Vec<String>,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get::<Expected>("news", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decoding(_)));
}

// ============================================================================
// Transport failures
// ============================================================================

#[tokio::test]
async fn test_slow_response_times_out_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = TransportClient::new(&Config {
        max_retries: 1,
        attempt_timeout_ms: 50,
        ..test_config(&server.uri())
    })
    .unwrap();

    let err = client.get::<Value>("news", &[]).await.unwrap_err();
    assert!(matches!(err, TransportError::Network { attempts: 2, .. }));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind then drop a listener to get a port nothing listens on
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let client = TransportClient::new(&Config {
        max_retries: 2,
        ..test_config(&uri)
    })
    .unwrap();

    let err = client.get::<Value>("news", &[]).await.unwrap_err();
    assert!(matches!(err, TransportError::Network { attempts: 3, .. }));
}

// ============================================================================
// Request shape
// ============================================================================

#[tokio::test]
async fn test_bearer_token_and_query_params_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .and(header("authorization", "Bearer secret-token"))
        .and(query_param("leagues", "epl,laliga"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = TransportClient::new(&Config {
        api_token: Some("secret-token".to_string()),
        ..test_config(&server.uri())
    })
    .unwrap();

    let body: Vec<Value> = client
        .get(
            "news",
            &[
                ("leagues", "epl,laliga".to_string()),
                ("limit", "20".to_string()),
            ],
        )
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let server = MockServer::start().await;
    let huge = "x".repeat(6 * 1024 * 1024);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(huge))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get::<Value>("news", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::ResponseTooLarge(_)));
}
