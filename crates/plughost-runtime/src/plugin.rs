//! Plugin trait and capability table.
//!
//! Plugins never get invoked by method-name reflection. Each plugin fills a
//! [`HandlerTable`] once at load time; the host looks handlers up by name.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PluginContext;
use crate::error::HostError;
use crate::events::Topic;
use crate::webhook::{WebhookAck, WebhookRequest};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Normalized query parameters handed to plugin code.
pub type QueryMap = BTreeMap<String, String>;

pub(crate) type MethodFn =
    Arc<dyn Fn(PluginContext) -> BoxFuture<'static, Result<(), HostError>> + Send + Sync>;
pub(crate) type ResponderFn =
    Arc<dyn Fn(PluginContext, Value) -> BoxFuture<'static, Result<(), HostError>> + Send + Sync>;
pub(crate) type CallbackFn = Arc<
    dyn Fn(PluginContext, WebhookRequest) -> BoxFuture<'static, Result<Value, HostError>>
        + Send
        + Sync,
>;

// ─── Plugin ─────────────────────────────────────────────────────────────

/// A user-supplied handler set.
///
/// Only [`Plugin::register`] is required. Webhook verification defaults to
/// rejecting everything and the OAuth hooks default to
/// [`HostError::UnsupportedOperation`].
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Populate the capability table: CLI methods, topic responders and
    /// callbacks.
    fn register(&self, table: &mut HandlerTable);

    /// Authenticate an inbound webhook before anything else runs.
    async fn verify_webhook(
        &self,
        _ctx: &PluginContext,
        _request: &WebhookRequest,
    ) -> Result<bool, HostError> {
        Ok(false)
    }

    /// Process a verified webhook. May call [`WebhookAck::acknowledge`] to
    /// answer the caller before slow work starts.
    async fn handle_webhook(
        &self,
        _ctx: &PluginContext,
        _request: &WebhookRequest,
        _ack: &WebhookAck,
    ) -> Result<bool, HostError> {
        Ok(false)
    }

    async fn oauth_get_url(
        &self,
        _ctx: &PluginContext,
        _params: &QueryMap,
    ) -> Result<String, HostError> {
        Err(HostError::UnsupportedOperation(
            "The plugin does not support OAuth.".into(),
        ))
    }

    async fn oauth_handle_redirect(
        &self,
        _ctx: &PluginContext,
        _params: &QueryMap,
    ) -> Result<(), HostError> {
        Err(HostError::UnsupportedOperation(
            "The plugin does not support OAuth.".into(),
        ))
    }

    async fn oauth_disconnect(
        &self,
        _ctx: &PluginContext,
        _params: &QueryMap,
    ) -> Result<(), HostError> {
        Err(HostError::UnsupportedOperation(
            "The plugin does not support OAuth.".into(),
        ))
    }
}

// ─── Capability table ───────────────────────────────────────────────────

/// Name → handler lookup for everything a plugin can be asked to run.
#[derive(Default)]
pub struct HandlerTable {
    methods: HashMap<String, MethodFn>,
    responders: HashMap<String, ResponderFn>,
    callbacks: HashMap<String, CallbackFn>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        let mut responders: Vec<_> = self.responders.keys().collect();
        let mut callbacks: Vec<_> = self.callbacks.keys().collect();
        methods.sort();
        responders.sort();
        callbacks.sort();
        f.debug_struct("HandlerTable")
            .field("methods", &methods)
            .field("responders", &responders)
            .field("callbacks", &callbacks)
            .finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method runnable from the CLI.
    pub fn method<F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        self.methods
            .insert(name.to_string(), Arc::new(move |ctx| Box::pin(handler(ctx))));
        self
    }

    /// Register a topic responder under its handler name, e.g.
    /// `respondOrderCreated`.
    pub fn responder<F, Fut>(&mut self, handler_name: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        self.responders.insert(
            handler_name.to_string(),
            Arc::new(move |ctx, message| Box::pin(handler(ctx, message))),
        );
        self
    }

    /// Register a responder for `resource:event`, deriving the handler name.
    pub fn on_topic<F, Fut>(&mut self, resource: &str, event: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        let name = Topic::handler_name_for(resource, event);
        self.responder(&name, handler)
    }

    /// Register a callback reachable through the shared-secret endpoint.
    pub fn callback<F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginContext, WebhookRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
    {
        self.callbacks.insert(
            name.to_string(),
            Arc::new(move |ctx, request| Box::pin(handler(ctx, request))),
        );
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn has_responder(&self, handler_name: &str) -> bool {
        self.responders.contains_key(handler_name)
    }

    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub(crate) fn get_method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    pub(crate) fn get_responder(&self, handler_name: &str) -> Option<ResponderFn> {
        self.responders.get(handler_name).cloned()
    }

    pub(crate) fn get_callback(&self, name: &str) -> Option<CallbackFn> {
        self.callbacks.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_lookup() {
        let mut table = HandlerTable::new();
        table
            .method("sync", |_ctx| async { Ok(()) })
            .on_topic("order", "created", |_ctx, _msg| async { Ok(()) })
            .responder("respondShipmentPacked", |_ctx, _msg| async { Ok(()) })
            .callback("status", |_ctx, _req| async { Ok(Value::Null) });

        assert!(table.has_method("sync"));
        assert!(!table.has_method("respondOrderCreated"));
        assert!(table.has_responder("respondOrderCreated"));
        assert!(table.has_responder("respondShipmentPacked"));
        assert!(table.has_callback("status"));
        assert!(table.get_callback("missing").is_none());
    }

    #[test]
    fn test_debug_lists_sorted_names() {
        let mut table = HandlerTable::new();
        table
            .method("zeta", |_ctx| async { Ok(()) })
            .method("alpha", |_ctx| async { Ok(()) });
        let printed = format!("{table:?}");
        assert!(printed.contains(r#"methods: ["alpha", "zeta"]"#), "{printed}");
    }
}
