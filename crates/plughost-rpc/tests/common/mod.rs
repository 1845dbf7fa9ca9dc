// Shared test utilities for RPC client integration tests
use std::sync::Arc;

use plughost_rpc::{Cache, RpcClient, RpcConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_LOGIN: &str = "api-user";
pub const TEST_PASSWORD: &str = "s3cret";

/// Build a client pointed at the mock platform.
pub fn client_for(server: &MockServer, cache: Arc<dyn Cache>) -> RpcClient {
    let config = RpcConfig::new(
        Some(server.uri()),
        Some(TEST_LOGIN.to_string()),
        Some(TEST_PASSWORD.to_string()),
    )
    .unwrap();
    RpcClient::new(config, cache).unwrap()
}

/// Mock a successful login returning `token`, expected `times` times.
pub async fn mount_login(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "login",
            "params": [TEST_LOGIN, TEST_PASSWORD],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": token })))
        .expect(times)
        .mount(server)
        .await;
}

/// Session-expired fault body (normalized code 5).
pub fn expired_body() -> Value {
    json!({ "result": null, "error": { "code": -32005, "message": "expired" } })
}
