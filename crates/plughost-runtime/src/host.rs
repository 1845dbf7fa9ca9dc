//! Plugin host composition.
//!
//! A [`PluginHost`] owns the one plugin instance of a process together with
//! its context, capability table, router and webhook responder. It is the
//! only entry point the CLI and HTTP front-ends use.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use plughost_rpc::{Cache, FileCache};
use serde_json::Value;

use crate::catalog::PluginCatalog;
use crate::config::{ConfigSource, HostPaths, TomlConfig, API_SECRET_KEY, CACHE_BACKEND, CACHE_SERVER};
use crate::context::PluginContext;
use crate::error::HostError;
use crate::events::EventRouter;
use crate::plugin::{HandlerTable, Plugin, QueryMap};
use crate::pubsub::{self, MessageBus, PubSubListener, PubSubSettings, RECONNECT_DELAY};
use crate::redis_cache::RedisCache;
use crate::webhook::{WebhookAck, WebhookRequest, WebhookResponder, WebhookResponse};

// ─── Instance slot ──────────────────────────────────────────────────────

/// Admits at most one [`PluginHost`] for its whole lifetime. Binaries create
/// one slot per process and pass it to construction.
#[derive(Debug, Default)]
pub struct HostSlot {
    claimed: AtomicBool,
}

impl HostSlot {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    fn claim(&self) -> Result<(), HostError> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(HostError::MultipleInstantiation(
                "A plugin is already loaded in this process.".into(),
            ));
        }
        Ok(())
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

// ─── Host ───────────────────────────────────────────────────────────────

pub struct PluginHost {
    plugin: Arc<dyn Plugin>,
    ctx: PluginContext,
    handlers: Arc<HandlerTable>,
    router: EventRouter,
    webhook: WebhookResponder,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugin", &self.ctx.code())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl PluginHost {
    /// Assemble a host from already-built collaborators.
    pub fn new(
        slot: &HostSlot,
        code: &str,
        plugin: Arc<dyn Plugin>,
        config: Arc<dyn ConfigSource>,
        cache: Arc<dyn Cache>,
        trace_dir: Option<PathBuf>,
    ) -> Result<Self, HostError> {
        slot.claim()?;

        let ctx = PluginContext::new(code, config, cache, trace_dir);
        let mut table = HandlerTable::new();
        plugin.register(&mut table);
        let handlers = Arc::new(table);
        tracing::debug!(plugin = %code, handlers = ?handlers, "plugin registered");

        Ok(Self {
            router: EventRouter::new(ctx.clone(), handlers.clone()),
            webhook: WebhookResponder::new(plugin.clone(), ctx.clone()),
            plugin,
            ctx,
            handlers,
        })
    }

    /// Load `code` from `catalog` with its configuration from the installation
    /// at `paths`. With `debug`, platform exchanges go to `logs/requests.log`.
    pub fn load(
        slot: &HostSlot,
        catalog: &PluginCatalog,
        paths: &HostPaths,
        code: &str,
        debug: bool,
    ) -> Result<Self, HostError> {
        let plugin = catalog.instantiate(code)?;
        let config = TomlConfig::load(paths, code)?;
        let cache = cache_backend(&config, paths)?;
        let trace_dir = debug.then(|| paths.logs_dir());
        tracing::info!(plugin = %code, root = %paths.root().display(), "loading plugin");
        Self::new(slot, code, plugin, Arc::new(config), cache, trace_dir)
    }

    pub fn code(&self) -> &str {
        self.ctx.code()
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    // ─── Entry points ───────────────────────────────────────────────────

    /// Run a CLI method registered by the plugin.
    pub async fn run_method(&self, name: &str) -> Result<(), HostError> {
        let method = self.handlers.get_method(name).ok_or_else(|| {
            HostError::UnsupportedOperation(format!("The plugin method \"{name}\" is not callable."))
        })?;
        tracing::info!(plugin = %self.code(), method = %name, "running method");
        method(self.ctx.clone()).await
    }

    /// Full webhook protocol; returns once the caller can be answered.
    pub async fn handle_webhook(&self, request: WebhookRequest) -> WebhookResponse {
        self.webhook.handle(request).await
    }

    /// Webhook protocol on the current task, answering through `ack`.
    pub async fn process_webhook(
        &self,
        request: &WebhookRequest,
        ack: &WebhookAck,
    ) -> Result<(), HostError> {
        self.webhook.process(request, ack).await
    }

    pub async fn dispatch_topic(&self, topic: &str, message: Value) -> Result<(), HostError> {
        self.router.dispatch(topic, message).await
    }

    /// Run a named callback after checking the request's `secret_key`
    /// against `middleware/api/secret_key`.
    pub async fn invoke_rpc(&self, name: &str, request: WebhookRequest) -> Result<Value, HostError> {
        let supplied = request
            .query_param("secret_key")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HostError::Authentication("Unknown secret key.".into()))?;
        let expected = self.ctx.host_config(API_SECRET_KEY).unwrap_or_default();
        if expected.is_empty() || !constant_time_eq(supplied, &expected) {
            return Err(HostError::Authentication("Invalid secret key.".into()));
        }

        let callback = self
            .handlers
            .get_callback(name)
            .ok_or_else(|| HostError::UnsupportedOperation("Unknown plugin method.".into()))?;

        tracing::debug!(plugin = %self.code(), callback = %name, "invoking callback");
        callback(self.ctx.clone(), request).await.map_err(|e| match e {
            HostError::Processing(_) => e,
            other => {
                tracing::warn!(plugin = %self.code(), callback = %name, "callback failed: {other}");
                HostError::Processing(format!("Callback request failed: {other}"))
            }
        })
    }

    // ─── Pub/sub ────────────────────────────────────────────────────────

    /// One subscription run against the configured bus.
    pub async fn listen(&self) -> Result<Infallible, HostError> {
        let settings = PubSubSettings::from_config(self.ctx.config_source().as_ref())?;
        PubSubListener::new(self.router.clone()).run(&settings).await
    }

    /// One subscription run against a caller-supplied bus.
    pub async fn listen_with<B: MessageBus + ?Sized>(
        &self,
        bus: &mut B,
    ) -> Result<Infallible, HostError> {
        PubSubListener::new(self.router.clone()).run_with(bus).await
    }

    /// Subscribe, and resubscribe after every loss, until a configuration
    /// error makes it pointless.
    pub async fn listen_forever(&self) -> HostError {
        pubsub::listen_forever(|| self.listen(), RECONNECT_DELAY).await
    }

    // ─── OAuth ──────────────────────────────────────────────────────────

    pub async fn oauth_get_url(&self, params: &QueryMap) -> Result<String, HostError> {
        self.plugin.oauth_get_url(&self.ctx, params).await
    }

    pub async fn oauth_handle_redirect(&self, params: &QueryMap) -> Result<(), HostError> {
        self.plugin.oauth_handle_redirect(&self.ctx, params).await
    }

    pub async fn oauth_disconnect(&self, params: &QueryMap) -> Result<(), HostError> {
        self.plugin.oauth_disconnect(&self.ctx, params).await
    }
}

/// Cache selected by `middleware/cache/backend`: `file` (default) keeps
/// entries under `<root>/tmp`, `redis` uses `middleware/cache/server`.
fn cache_backend(config: &dyn ConfigSource, paths: &HostPaths) -> Result<Arc<dyn Cache>, HostError> {
    match config.get(CACHE_BACKEND).as_deref().map(str::trim) {
        None | Some("") | Some("file") => Ok(Arc::new(FileCache::new(paths.tmp_dir()))),
        Some("redis") => {
            let server = config.get(CACHE_SERVER).unwrap_or_default();
            Ok(Arc::new(RedisCache::connect(&server)?))
        }
        Some(other) => Err(HostError::Configuration(format!(
            "Unknown cache backend \"{other}\"."
        ))),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
