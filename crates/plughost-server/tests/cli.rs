mod common;

use clap::Parser;
use common::write_installation;
use plughost_runtime::HostError;
use plughost_server::cli::{failure_line, run, Cli};
use plughost_server::plugins;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("plughost").chain(args.iter().copied())).unwrap()
}

#[tokio::test]
async fn method_mode_runs_the_plugin_method() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "login" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "sess" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "order.search"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "params": ["sess", "state.set"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), &server.uri());

    run(&parse(&["orders", "sync"]), &plugins::catalog(), &paths)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_method_fails_without_platform_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "http://unused");

    let err = run(&parse(&["orders", "refund"]), &plugins::catalog(), &paths)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::UnsupportedOperation(_)));
    assert_eq!(
        failure_line(&err, false),
        "UnsupportedOperation: The plugin method \"refund\" is not callable."
    );
}

#[tokio::test]
async fn listen_mode_stops_on_inactive_pubsub() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "http://unused");

    let err = run(&parse(&["orders", "--listen"]), &plugins::catalog(), &paths)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        failure_line(&err, false),
        "ConfigurationError: The pub/sub feature is not active."
    );
}

#[tokio::test]
async fn unknown_plugin_is_reported_by_kind() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = write_installation(tmp.path(), "http://unused");

    let err = run(&parse(&["billing", "sync"]), &plugins::catalog(), &paths)
        .await
        .unwrap_err();
    assert_eq!(
        failure_line(&err, false),
        "PluginNotFound: The plugin \"billing\" does not exist."
    );
}
