// Shared test utilities for plugin host integration tests
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use plughost_runtime::{
    HandlerTable, HostError, HostPaths, Plugin, PluginCatalog, PluginContext, WebhookAck,
    WebhookRequest,
};
use serde_json::json;

/// Lay out `<root>/plugins/<plugin>/etc/config.toml` and `<root>/etc/local.toml`.
pub fn write_installation(root: &Path, plugin: &str, plugin_toml: &str, local_toml: &str) -> HostPaths {
    let paths = HostPaths::new(root);
    let plugin_file = paths.plugin_config_file(plugin);
    std::fs::create_dir_all(plugin_file.parent().unwrap()).unwrap();
    std::fs::write(&plugin_file, plugin_toml).unwrap();
    let local_file = paths.local_config_file();
    std::fs::create_dir_all(local_file.parent().unwrap()).unwrap();
    std::fs::write(&local_file, local_toml).unwrap();
    paths
}

pub fn local_toml(platform_uri: &str) -> String {
    format!(
        r#"
[default.middleware.api]
base_url = "{platform_uri}"
login = "api-user"
password = "s3cret"
secret_key = "shh"
"#
    )
}

pub const SHIPPING_TOML: &str = r#"
[default.plugin.shipping]
hook_token = "tok"

[default.plugin.shipping.events.shipment]
packed = true
"#;

/// Forwards shipments to the platform; acknowledges webhooks before the RPC call.
pub struct Shipping;

#[async_trait]
impl Plugin for Shipping {
    fn register(&self, table: &mut HandlerTable) {
        table
            .method("ping", |ctx: PluginContext| async move {
                ctx.call("system.ping", json!([])).await?;
                Ok(())
            })
            .on_topic("shipment", "packed", |ctx: PluginContext, message| async move {
                ctx.call("shipment.track", json!([message["id"]])).await?;
                Ok(())
            });
    }

    async fn verify_webhook(
        &self,
        ctx: &PluginContext,
        request: &WebhookRequest,
    ) -> Result<bool, HostError> {
        Ok(request.header("x-hook-token").is_some()
            && request.header("x-hook-token").map(str::to_string) == ctx.config("hook_token"))
    }

    async fn handle_webhook(
        &self,
        ctx: &PluginContext,
        request: &WebhookRequest,
        ack: &WebhookAck,
    ) -> Result<bool, HostError> {
        ack.write(b"queued");
        ack.acknowledge();
        let payload: serde_json::Value = serde_json::from_slice(&request.body)?;
        ctx.call("shipment.import", payload).await?;
        Ok(true)
    }
}

pub fn catalog() -> PluginCatalog {
    PluginCatalog::new().with("shipping", || Arc::new(Shipping))
}
