// Integration tests for `RestClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use halite_api::{Error, RestClient, TokenCache, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base: Url = server.uri().parse().expect("mock server URL");
    let client = RestClient::new(base, &TransportConfig::default(), TokenCache::new())
        .expect("client construction");
    (server, client)
}

fn login_body(token: &str) -> serde_json::Value {
    json!({
        "success": true,
        "token": token,
        "data": {
            "member": { "email": "user@example.com", "phone": "555-0100" },
            "ownedDevices": [
                {
                    "id": 132,
                    "nickname": "Backyard",
                    "serialNumber": "SN-100",
                    "deviceType": "G+",
                    "firmware-main-current": "2.1.0"
                }
            ],
            "devices": []
        }
    })
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_caches_token_and_returns_devices() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({
            "email": "user@example.com",
            "password": "hunter2",
            "fcmToken": "",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("tok-1")))
        .mount(&server)
        .await;

    let envelope = client
        .login("user@example.com", &SecretString::from("hunter2"))
        .await
        .expect("login");

    assert!(envelope.success);
    let data = envelope.data.expect("account data");
    assert_eq!(data.all_devices().count(), 1);
    assert!(client.tokens().is_set().await);
}

#[tokio::test]
async fn login_rejection_is_login_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Invalid email or password"
        })))
        .mount(&server)
        .await;

    let result = client
        .login("user@example.com", &SecretString::from("wrong"))
        .await;

    match result {
        Err(Error::Login { ref message }) => {
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected Login error, got: {other:?}"),
    }
    assert!(!client.tokens().is_set().await);
}

#[tokio::test]
async fn check_token_sends_bearer_header() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok-9")).await;

    Mock::given(method("GET"))
        .and(path("/check-token"))
        .and(header("authorization", "Bearer tok-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("ignored")))
        .mount(&server)
        .await;

    let envelope = client.check_token().await.expect("check-token");
    assert!(envelope.success);
}

#[tokio::test]
async fn expired_token_maps_to_invalid_token() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("stale")).await;

    Mock::given(method("GET"))
        .and(path("/check-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.check_token().await;
    assert!(
        matches!(result, Err(Error::InvalidToken { .. })),
        "expected InvalidToken, got: {result:?}"
    );
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn device_status_returns_telemetry_map() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok")).await;

    Mock::given(method("GET"))
        .and(path("/device-status"))
        .and(query_param("_deviceId", "132"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "runtime-ph-value": 725,
                "runtime-device-on": "1",
                "isDeviceConnected": "true"
            }
        })))
        .mount(&server)
        .await;

    let telemetry = client
        .device_status(132)
        .await
        .expect("device-status")
        .expect("telemetry present");

    assert_eq!(telemetry.get("runtime-ph-value"), Some(&json!(725)));
    assert_eq!(telemetry.get("runtime-device-on"), Some(&json!("1")));
}

#[tokio::test]
async fn device_status_failure_is_none_not_error() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok")).await;

    Mock::given(method("GET"))
        .and(path("/device-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "device offline"
        })))
        .mount(&server)
        .await;

    let telemetry = client.device_status(5).await.expect("call succeeds");
    assert!(telemetry.is_none());
}

#[tokio::test]
async fn device_status_403_maps_to_invalid_token() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("revoked")).await;

    Mock::given(method("GET"))
        .and(path("/device-status"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client.device_status(5).await;
    assert!(matches!(result, Err(Error::InvalidToken { .. })));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn set_value_posts_nested_payload() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok")).await;

    Mock::given(method("POST"))
        .and(path("/device-update"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({
            "_deviceId": 132,
            "data": { "config": { "user": { "ph": 740 } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    client
        .set_value(132, "config-user-ph", json!(740))
        .await
        .expect("set_value");
}

#[tokio::test]
async fn rejected_write_is_operation_failed() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok")).await;

    Mock::given(method("POST"))
        .and(path("/device-update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "value out of range"
        })))
        .mount(&server)
        .await;

    let result = client.set_value(132, "config-user-orp", json!(9000)).await;

    match result {
        Err(Error::OperationFailed {
            ref operation,
            ref message,
        }) => {
            assert_eq!(operation, "config-user-orp");
            assert_eq!(message, "value out of range");
        }
        other => panic!("expected OperationFailed, got: {other:?}"),
    }
}

#[tokio::test]
async fn set_direct_request_passes_body_through() {
    let (server, client) = setup().await;
    client.tokens().set(SecretString::from("tok")).await;

    let body = json!({
        "_deviceId": 7,
        "data": { "runtime": { "device": { "on": 1, "turbo": 0, "turboTime": 8 } } }
    });

    Mock::given(method("POST"))
        .and(path("/device-update"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    client
        .set_direct_request("runtime-device-on", body)
        .await
        .expect("direct request");
}
