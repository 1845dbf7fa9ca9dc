//! Plughost runtime
//!
//! Hosts exactly one plugin per process and routes the four kinds of work a
//! front-end can hand it: CLI method invocations, pub/sub topic messages,
//! inbound webhooks (with early acknowledge) and shared-secret callbacks.
//! Plugin code reaches the remote platform through [`PluginContext`], which
//! owns the lazily built JSON-RPC session client.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod plugin;
pub mod pubsub;
pub mod redis_cache;
pub mod webhook;

pub use catalog::{PluginCatalog, PluginFactory};
pub use config::{is_truthy, ConfigSource, HostPaths, MapConfig, TomlConfig};
pub use context::PluginContext;
pub use error::HostError;
pub use events::{EventRouter, Topic};
pub use host::{HostSlot, PluginHost};
pub use plugin::{BoxFuture, HandlerTable, Plugin, QueryMap};
pub use pubsub::{
    listen_forever, BusMessage, ChannelBus, MessageBus, PubSubListener, PubSubSettings, RedisBus,
    RECONNECT_DELAY,
};
pub use redis_cache::RedisCache;
pub use webhook::{WebhookAck, WebhookRequest, WebhookResponder, WebhookResponse};

pub use plughost_rpc as rpc;
