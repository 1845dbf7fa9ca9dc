//! Order import plugin.
//!
//! Pulls pending orders from the platform on `sync`, imports orders announced
//! on `order:created`, accepts order webhooks from a storefront (answering
//! the storefront before the slow import), exposes a `status` callback and
//! keeps an OAuth grant for the storefront API.
//!
//! Plugin settings (under `plugin/orders/`): `webhook_token`,
//! `oauth/authorize_url`, `oauth/client_id`.

use async_trait::async_trait;
use plughost_runtime::{
    HandlerTable, HostError, Plugin, PluginContext, QueryMap, WebhookAck, WebhookRequest,
};
use serde_json::{json, Value};

pub const CODE: &str = "orders";

const TOKEN_HEADER: &str = "x-webhook-token";
const LAST_SYNC_KEY: &str = "orders:last_sync_count";
const OAUTH_GRANT_KEY: &str = "orders:oauth_code";

pub struct Orders;

async fn sync(ctx: PluginContext) -> Result<(), HostError> {
    let orders = ctx.call("order.search", json!([{ "status": "pending" }])).await?;
    let count = orders.as_array().map_or(0, Vec::len);
    for order in orders.as_array().into_iter().flatten() {
        if let Some(id) = order.get("order_id") {
            ctx.call("order.import", json!([id])).await?;
        }
    }
    ctx.save_cache(LAST_SYNC_KEY, &json!(count), Some(0)).await?;
    ctx.set_state("last_sync_count", json!(count)).await?;
    tracing::info!(plugin = %ctx.code(), count, "orders synced");
    Ok(())
}

async fn order_created(ctx: PluginContext, message: Value) -> Result<(), HostError> {
    let id = message
        .get("order_id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| HostError::Processing("order:created without order_id".into()))?;
    ctx.call("order.import", json!([id])).await?;
    Ok(())
}

async fn status(ctx: PluginContext, _request: WebhookRequest) -> Result<Value, HostError> {
    Ok(json!({
        "plugin": ctx.code(),
        "last_sync_count": ctx.load_cache(LAST_SYNC_KEY).await?,
        "connected": ctx.load_cache(OAUTH_GRANT_KEY).await?.is_some(),
    }))
}

#[async_trait]
impl Plugin for Orders {
    fn register(&self, table: &mut HandlerTable) {
        table
            .method("sync", sync)
            .on_topic("order", "created", order_created)
            .callback("status", status);
    }

    async fn verify_webhook(
        &self,
        ctx: &PluginContext,
        request: &WebhookRequest,
    ) -> Result<bool, HostError> {
        let Some(expected) = ctx.config("webhook_token").filter(|t| !t.is_empty()) else {
            tracing::warn!(plugin = %ctx.code(), "webhook_token is not configured");
            return Ok(false);
        };
        Ok(request.header(TOKEN_HEADER) == Some(expected.as_str()))
    }

    async fn handle_webhook(
        &self,
        ctx: &PluginContext,
        request: &WebhookRequest,
        ack: &WebhookAck,
    ) -> Result<bool, HostError> {
        let Ok(payload) = serde_json::from_slice::<Value>(&request.body) else {
            return Ok(false);
        };
        let Some(id) = payload.get("order_id").cloned() else {
            return Ok(false);
        };

        // The storefront only needs to know the order was accepted.
        ack.write(br#"{"accepted":true}"#);
        ack.acknowledge();

        ctx.call("order.import", json!([id, payload])).await?;
        Ok(true)
    }

    async fn oauth_get_url(
        &self,
        ctx: &PluginContext,
        _params: &QueryMap,
    ) -> Result<String, HostError> {
        let authorize = ctx.config("oauth/authorize_url").ok_or_else(|| {
            HostError::Configuration("plugin/orders/oauth/authorize_url is not configured.".into())
        })?;
        let client_id = ctx.config("oauth/client_id").unwrap_or_default();
        Ok(format!("{authorize}?client_id={client_id}&state={}", ctx.code()))
    }

    async fn oauth_handle_redirect(
        &self,
        ctx: &PluginContext,
        params: &QueryMap,
    ) -> Result<(), HostError> {
        let code = params
            .get("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| HostError::BadRequest("missing authorization code".into()))?;
        ctx.save_cache(OAUTH_GRANT_KEY, &json!(code), Some(0)).await?;
        tracing::info!(plugin = %ctx.code(), "storefront connected");
        Ok(())
    }

    async fn oauth_disconnect(
        &self,
        ctx: &PluginContext,
        _params: &QueryMap,
    ) -> Result<(), HostError> {
        ctx.remove_cache(OAUTH_GRANT_KEY).await?;
        tracing::info!(plugin = %ctx.code(), "storefront disconnected");
        Ok(())
    }
}
