mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{catalog, local_toml, write_installation, SHIPPING_TOML};
use plughost_runtime::{
    BusMessage, ChannelBus, HostError, HostSlot, PluginHost, WebhookRequest,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "login", "params": ["api-user", "s3cret"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "sess" })))
        .expect(times)
        .mount(server)
        .await;
}

// ─── Loading ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_plugin_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, "");
    let err = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "ghost", false).unwrap_err();
    assert!(matches!(err, HostError::PluginNotFound(_)));
}

#[tokio::test]
async fn session_token_survives_across_processes() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "system.ping"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "pong" })))
        .expect(2)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, &local_toml(&server.uri()));

    // Each slot stands in for a separate process sharing the file cache.
    for _ in 0..2 {
        let host = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "shipping", false).unwrap();
        host.run_method("ping").await.unwrap();
    }
    assert!(paths.tmp_dir().read_dir().unwrap().next().is_some());
}

// ─── Topics ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn bus_messages_reach_the_platform_in_order() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "shipment.track", [1]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "shipment.track", [2]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, &local_toml(&server.uri()));
    let host = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "shipping", false).unwrap();

    let (tx, mut bus) = ChannelBus::new(8);
    tx.send(BusMessage::new("events:shipment:packed", r#"{"id":1}"#)).await.unwrap();
    // Not enabled in config: logged and skipped
    tx.send(BusMessage::new("events:shipment:lost", r#"{"id":9}"#)).await.unwrap();
    tx.send(BusMessage::new("events:shipment:packed", r#"{"id":2}"#)).await.unwrap();
    drop(tx);

    let err = host.listen_with(&mut bus).await.unwrap_err();
    assert!(matches!(err, HostError::Bus(_)));
}

// ─── Webhooks ───────────────────────────────────────────────────────────

#[tokio::test]
async fn webhook_is_acknowledged_before_slow_platform_call() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "shipment.import", {"sku": "A1"}] })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "result": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, &local_toml(&server.uri()));
    let host = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "shipping", false).unwrap();

    let mut headers = BTreeMap::new();
    headers.insert("x-hook-token".to_string(), "tok".to_string());
    let request = WebhookRequest::new(BTreeMap::new(), headers, r#"{"sku":"A1"}"#);

    let started = std::time::Instant::now();
    let response = host.handle_webhook(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"queued");
    assert!(started.elapsed() < Duration::from_secs(2));

    // Let the detached import finish so the mock expectation is met.
    tokio::time::sleep(Duration::from_millis(3500)).await;
}

#[tokio::test]
async fn webhook_with_bad_token_is_forbidden() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, &local_toml("http://unused"));
    let host = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "shipping", false).unwrap();

    let mut headers = BTreeMap::new();
    headers.insert("x-hook-token".to_string(), "wrong".to_string());
    let response = host
        .handle_webhook(WebhookRequest::new(BTreeMap::new(), headers, "{}"))
        .await;
    assert_eq!(response.status, 403);
    assert!(response.body.is_empty());
}

// ─── Debug tracing ──────────────────────────────────────────────────────

#[tokio::test]
async fn debug_mode_writes_request_log() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "call" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "pong" })))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "shipping", SHIPPING_TOML, &local_toml(&server.uri()));
    let host = PluginHost::load(&HostSlot::new(), &catalog(), &paths, "shipping", true).unwrap();
    assert!(host.context().is_debug());
    host.run_method("ping").await.unwrap();

    let log = std::fs::read_to_string(paths.logs_dir().join("requests.log")).unwrap();
    assert!(log.contains(">>>>>>>>> system.ping >>>>>>>>>"));
}
