// Shared test utilities for HTTP front-end integration tests
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use plughost_runtime::{HostPaths, HostSlot, PluginHost};
use plughost_server::{api, plugins};

#[allow(dead_code)]
pub const WEBHOOK_TOKEN: &str = "hook-secret";
pub const SECRET_KEY: &str = "cb-secret";

pub const ORDERS_TOML: &str = r#"
[default.plugin.orders]
webhook_token = "hook-secret"

[default.plugin.orders.oauth]
authorize_url = "https://shop.test/authorize"
client_id = "cid"

[default.plugin.orders.events.order]
created = true
"#;

/// Write an `orders` installation pointing at `platform_uri`.
pub fn write_installation(root: &Path, platform_uri: &str) -> HostPaths {
    let paths = HostPaths::new(root);
    let plugin_file = paths.plugin_config_file("orders");
    std::fs::create_dir_all(plugin_file.parent().unwrap()).unwrap();
    std::fs::write(&plugin_file, ORDERS_TOML).unwrap();

    let local_file = paths.local_config_file();
    std::fs::create_dir_all(local_file.parent().unwrap()).unwrap();
    std::fs::write(
        &local_file,
        format!(
            r#"
[default.middleware.api]
base_url = "{platform_uri}"
login = "api-user"
password = "s3cret"
secret_key = "{SECRET_KEY}"
"#
        ),
    )
    .unwrap();
    paths
}

/// Write an `orders` installation and build the router over it.
#[allow(dead_code)]
pub fn test_app(root: &Path, platform_uri: &str) -> Router {
    let paths = write_installation(root, platform_uri);
    let host = PluginHost::load(&HostSlot::new(), &plugins::catalog(), &paths, "orders", false).unwrap();
    api::router(Arc::new(host))
}
