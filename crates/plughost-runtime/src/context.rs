//! Helpers available to plugin code.
//!
//! A `PluginContext` is cheap to clone and is handed to every plugin handler.
//! The platform RPC client is built on first use so methods that never talk
//! to the platform do not need API credentials configured.

use std::path::PathBuf;
use std::sync::Arc;

use plughost_rpc::{Cache, RequestTrace, RpcClient, RpcConfig};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::{ConfigSource, API_BASE_URL, API_LOGIN, API_PASSWORD};
use crate::error::HostError;

/// RPC method used to persist plugin state on the platform.
pub const STATE_SET_METHOD: &str = "state.set";
/// RPC method used to read plugin state back.
pub const STATE_GET_METHOD: &str = "state.get";

#[derive(Clone)]
pub struct PluginContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    code: String,
    config: Arc<dyn ConfigSource>,
    cache: Arc<dyn Cache>,
    /// Directory for `requests.log`; `Some` when running with `--debug`.
    trace_dir: Option<PathBuf>,
    rpc: OnceCell<Arc<RpcClient>>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("code", &self.inner.code)
            .field("debug", &self.is_debug())
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub fn new(
        code: impl Into<String>,
        config: Arc<dyn ConfigSource>,
        cache: Arc<dyn Cache>,
        trace_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                code: code.into(),
                config,
                cache,
                trace_dir,
                rpc: OnceCell::new(),
            }),
        }
    }

    pub fn code(&self) -> &str {
        &self.inner.code
    }

    pub fn is_debug(&self) -> bool {
        self.inner.trace_dir.is_some()
    }

    pub fn config_source(&self) -> &Arc<dyn ConfigSource> {
        &self.inner.config
    }

    // ─── Configuration ──────────────────────────────────────────────────

    /// Plugin-scoped lookup: `path` resolves under `plugin/<code>/`.
    pub fn config(&self, path: &str) -> Option<String> {
        self.host_config(&format!("plugin/{}/{}", self.inner.code, path.trim_matches('/')))
    }

    /// Raw lookup of any key, e.g. `middleware/api/base_url`.
    pub fn host_config(&self, path: &str) -> Option<String> {
        self.inner.config.get(path)
    }

    // ─── Platform RPC ───────────────────────────────────────────────────

    /// The session client, built from `middleware/api/*` on first use.
    pub async fn rpc(&self) -> Result<&Arc<RpcClient>, HostError> {
        self.inner
            .rpc
            .get_or_try_init(|| async { self.build_client().map(Arc::new) })
            .await
    }

    fn build_client(&self) -> Result<RpcClient, HostError> {
        let config = RpcConfig::new(
            self.host_config(API_BASE_URL),
            self.host_config(API_LOGIN),
            self.host_config(API_PASSWORD),
        )?
        .with_user_agent(format!("plughost ({})", self.inner.code));

        let mut client = RpcClient::new(config, self.inner.cache.clone())?;
        if let Some(dir) = &self.inner.trace_dir {
            client = client.with_trace(RequestTrace::in_dir(dir));
        }
        tracing::debug!(plugin = %self.inner.code, "platform client ready");
        Ok(client)
    }

    /// Call a platform method, re-authenticating once on session expiry.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, HostError> {
        Ok(self.rpc().await?.call(method, args).await?)
    }

    /// Persist plugin state on the platform.
    pub async fn set_state(&self, data: &str, value: Value) -> Result<Value, HostError> {
        self.call(STATE_SET_METHOD, json!({ "data": data, "value": value }))
            .await
    }

    /// Read plugin state; `keys` is a single key or a list of keys.
    pub async fn get_state(&self, keys: impl Into<Value>) -> Result<Value, HostError> {
        self.call(STATE_GET_METHOD, json!([keys.into()])).await
    }

    // ─── Cache ──────────────────────────────────────────────────────────

    pub async fn load_cache(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.inner.cache.load(key).await?)
    }

    /// `lifetime` of `None` uses the cache default; `Some(0)` never expires.
    pub async fn save_cache(
        &self,
        key: &str,
        value: &Value,
        lifetime: Option<u64>,
    ) -> Result<(), HostError> {
        Ok(self.inner.cache.save(key, value, lifetime).await?)
    }

    pub async fn remove_cache(&self, key: &str) -> Result<(), HostError> {
        Ok(self.inner.cache.remove(key).await?)
    }
}
