use assert_matches::assert_matches;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_backend::{ApiClient, ApiError, Method};
use shared_config::AppConfig;

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        emergency_api_url: server.uri(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_request_decodes_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/emergency/E-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "dispatched"})))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(&config_for(&mock_server)).unwrap();
    let body: Value = client
        .request(Method::GET, "/emergency/E-1/status", None)
        .await
        .unwrap();

    assert_eq!(body["status"], "dispatched");
}

#[tokio::test]
async fn test_bearer_token_is_sent_when_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server);
    config.emergency_api_token = Some("secret-token".to_string());

    let client = ApiClient::new(&config).unwrap();
    let body: Value = client.request(Method::GET, "/ping", None).await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such emergency"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(&config_for(&mock_server)).unwrap();

    let missing = client.request::<Value>(Method::GET, "/missing", None).await;
    assert_matches!(missing, Err(ApiError::NotFound(body)) if body == "no such emergency");

    let forbidden = client.request::<Value>(Method::GET, "/forbidden", None).await;
    assert_matches!(forbidden, Err(ApiError::Unauthorized(_)));

    let broken = client.request::<Value>(Method::GET, "/broken", None).await;
    assert_matches!(broken, Err(ApiError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_empty_body_is_none_for_optional_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emergency/E-1/cancel"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(&config_for(&mock_server)).unwrap();
    let ack: Option<Value> = client
        .request_optional(Method::POST, "/emergency/E-1/cancel", None)
        .await
        .unwrap();

    assert!(ack.is_none());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(&config_for(&mock_server)).unwrap();
    let result = client.request::<Value>(Method::GET, "/garbled", None).await;
    assert_matches!(result, Err(ApiError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let config = AppConfig {
        emergency_api_url: "http://127.0.0.1:1".to_string(),
        request_timeout_ms: 500,
        ..AppConfig::default()
    };

    let client = ApiClient::new(&config).unwrap();
    let result = client.request::<Value>(Method::GET, "/emergency/E-1", None).await;
    assert_matches!(result, Err(ApiError::Transport(_)));
}
