// Coordinator lifecycle tests against a mock vendor cloud.

use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use halite_api::TransportConfig;
use halite_core::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, EntityAction, PollState, ReadingValue,
};

const DEVICE_ID: u64 = 132;

fn config(server: &MockServer) -> CoordinatorConfig {
    CoordinatorConfig {
        base_url: Url::parse(&server.uri()).expect("mock server uri"),
        username: "user@example.com".into(),
        password: SecretString::from("hunter2"),
        // Zero disables the background task; tests drive refresh() directly.
        poll_interval: Duration::ZERO,
        automation_channels: 7,
        transport: TransportConfig::default(),
    }
}

fn login_body() -> Value {
    json!({
        "success": true,
        "token": "session-token",
        "data": {
            "member": {"email": "user@example.com"},
            "ownedDevices": [
                {"id": DEVICE_ID, "nickname": "Backyard", "serialNumber": "SN-100"}
            ],
            "devices": []
        }
    })
}

fn status_body(telemetry: Value) -> Value {
    json!({"success": true, "data": telemetry})
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(server)
        .await;
}

async fn mount_check_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/check-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, telemetry: Value) {
    Mock::given(method("GET"))
        .and(path("/device-status"))
        .and(query_param("_deviceId", DEVICE_ID.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(telemetry)))
        .mount(server)
        .await;
}

fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<CoordinatorEvent>,
) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Connect and retry ────────────────────────────────────────────────

#[tokio::test]
async fn connect_fetches_devices_and_readings() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(
        &server,
        json!({"runtime-ph-value": 725, "runtime-waterTemperature-value": 2350}),
    )
    .await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    assert_eq!(coordinator.current_state(), PollState::Ready);

    let device = coordinator.store().get(DEVICE_ID).expect("device stored");
    assert_eq!(device.name(), "Backyard");

    let ph = coordinator
        .store()
        .reading(DEVICE_ID, "runtime-ph-value")
        .expect("ph reading");
    assert_eq!(ph.value, ReadingValue::Number(7.25));

    let water = coordinator
        .store()
        .reading(DEVICE_ID, "runtime-waterTemperature-value")
        .expect("water reading");
    assert_eq!(water.value, ReadingValue::Number(23.5));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn connect_recovers_after_transient_failures() {
    let server = MockServer::start().await;

    // First two login attempts are rejected, the third succeeds.
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"success": false, "message": "upstream error"})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_login(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");

    let started = Instant::now();
    coordinator.connect().await.expect("third attempt succeeds");
    let elapsed = started.elapsed();

    // Two retry pauses of one second each.
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert_eq!(coordinator.current_state(), PollState::Ready);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn exhausted_retries_degrade_and_keep_stale_data() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    // The cloud goes down: every subsequent call is rejected.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/check-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": false})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"success": false, "message": "nope"})),
        )
        .mount(&server)
        .await;

    let result = coordinator.refresh().await;
    assert!(result.is_err(), "exhausted round must surface an error");
    assert_eq!(coordinator.current_state(), PollState::Degraded);

    // Previous readings survive the failed round.
    let ph = coordinator
        .store()
        .reading(DEVICE_ID, "runtime-ph-value")
        .expect("stale reading retained");
    assert_eq!(ph.value, ReadingValue::Number(7.25));
    assert!(coordinator.store().get(DEVICE_ID).is_some());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn degraded_first_round_recovers_on_schedule() {
    let server = MockServer::start().await;
    // The whole first round fails; later rounds find a healthy cloud.
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"success": false, "message": "maintenance"})),
        )
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_login(&server).await;
    mount_check_token(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let mut cfg = config(&server);
    // Longer than a full failed round, so scheduled polls never overlap
    // the connect round.
    cfg.poll_interval = Duration::from_secs(3);
    let coordinator = Coordinator::new(cfg).expect("coordinator");

    let result = coordinator.connect().await;
    assert!(result.is_err(), "exhausted first round surfaces its error");
    // Observable without anyone holding a state subscription.
    assert_eq!(coordinator.current_state(), PollState::Degraded);

    // The background poll task was still started and brings the
    // instance back on its own.
    let mut state = coordinator.poll_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == PollState::Ready),
    )
    .await
    .expect("recovered before timeout")
    .expect("state sender alive");
    assert!(coordinator.store().get(DEVICE_ID).is_some());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancels_inflight_round() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(100);
    let coordinator = Coordinator::new(cfg).expect("coordinator");
    coordinator.connect().await.expect("connect");

    // Subsequent rounds stall on a slow backend.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/check-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(login_body())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    // Let a scheduled round get in flight.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    coordinator.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "teardown must drop the in-flight round, not wait it out"
    );
}

// ── Events ───────────────────────────────────────────────────────────

#[tokio::test]
async fn device_discovered_fires_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_check_token(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    let mut events = coordinator.events();

    coordinator.connect().await.expect("connect");
    coordinator.refresh().await.expect("second cycle");
    coordinator.refresh().await.expect("third cycle");

    let discoveries = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, CoordinatorEvent::DeviceDiscovered { .. }))
        .count();
    assert_eq!(discoveries, 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn readings_changed_carries_only_the_diff() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(
        &server,
        json!({"runtime-ph-value": 725, "runtime-orp-value": 700}),
    )
    .await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    let mut events = coordinator.events();
    coordinator.connect().await.expect("connect");

    // First cycle reports everything as new.
    let initial = drain_events(&mut events);
    assert!(initial.iter().any(|event| matches!(
        event,
        CoordinatorEvent::ReadingsChanged { keys, .. } if keys.len() == 2
    )));

    // Second cycle: only the pH moved.
    server.reset().await;
    mount_check_token(&server).await;
    mount_status(
        &server,
        json!({"runtime-ph-value": 730, "runtime-orp-value": 700}),
    )
    .await;
    coordinator.refresh().await.expect("second cycle");

    let changed: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            CoordinatorEvent::ReadingsChanged { keys, .. } => Some(keys),
            CoordinatorEvent::DeviceDiscovered { .. } => None,
        })
        .collect();
    assert_eq!(changed, vec![vec!["runtime-ph-value".to_owned()]]);

    coordinator.shutdown().await;
}

// ── Actions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn number_write_posts_encoded_value_and_refreshes() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(&server, json!({"config-user-ph": 725})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    server.reset().await;
    mount_check_token(&server).await;
    mount_status(&server, json!({"config-user-ph": 730})).await;
    Mock::given(method("POST"))
        .and(path("/device-update"))
        .and(body_json(json!({
            "_deviceId": DEVICE_ID,
            "data": {"config": {"user": {"ph": 730}}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    coordinator
        .execute_action(
            DEVICE_ID,
            "config-user-ph",
            EntityAction::SetNativeValue,
            Some(json!(7.30)),
        )
        .await
        .expect("write");

    // The forced refresh picked up the accepted value.
    let ph = coordinator
        .store()
        .reading(DEVICE_ID, "config-user-ph")
        .expect("reading");
    assert_eq!(ph.value, ReadingValue::Number(7.30));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn master_power_write_carries_turbo_state() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let telemetry = json!({
        "runtime-device-on": 0,
        "runtime-device-turbo": 1,
        "runtime-device-turboTime": 8,
    });
    mount_status(&server, telemetry.clone()).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    server.reset().await;
    mount_check_token(&server).await;
    mount_status(&server, telemetry).await;
    Mock::given(method("POST"))
        .and(path("/device-update"))
        .and(body_json(json!({
            "_deviceId": DEVICE_ID,
            "data": {"runtime": {"device": {"on": 1, "turbo": 1, "turboTime": 8}}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    coordinator
        .execute_action(DEVICE_ID, "runtime-device-on", EntityAction::TurnOn, None)
        .await
        .expect("power on");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn select_rejects_non_integer_options() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(&server, json!({"config-automation-channel1-mode": 0})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    let result = coordinator
        .execute_action(
            DEVICE_ID,
            "config-automation-channel1-mode",
            EntityAction::SelectOption,
            Some(json!("not-a-number")),
        )
        .await;
    assert!(result.is_err());

    coordinator.shutdown().await;
}

// ── Diagnostics ──────────────────────────────────────────────────────

#[tokio::test]
async fn diagnostics_redact_account_details() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_status(&server, json!({"runtime-ph-value": 725})).await;

    let coordinator = Coordinator::new(config(&server)).expect("coordinator");
    coordinator.connect().await.expect("connect");

    let dump = coordinator.diagnostics().await;
    let text = dump.to_string();
    assert!(!text.contains("user@example.com"));
    assert!(!text.contains("SN-100"));
    assert!(text.contains("runtime-ph-value"));

    coordinator.shutdown().await;
}
