//! Topic parsing and topic → responder routing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::context::PluginContext;
use crate::error::HostError;
use crate::plugin::HandlerTable;

// ─── Topic ──────────────────────────────────────────────────────────────

/// A `resource:event` notification name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    resource: String,
    event: String,
}

impl Topic {
    pub fn new(resource: &str, event: &str) -> Result<Self, HostError> {
        format!("{resource}:{event}").parse()
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// `respond` followed by each segment with its first letter uppercased.
    /// The rest of each segment is left untouched.
    pub fn handler_name(&self) -> String {
        Self::handler_name_for(&self.resource, &self.event)
    }

    pub fn handler_name_for(resource: &str, event: &str) -> String {
        format!("respond{}{}", ucfirst(resource), ucfirst(event))
    }

    /// Configuration flag that must be truthy for `plugin` to receive this topic.
    pub fn config_path(&self, plugin: &str) -> String {
        format!("plugin/{plugin}/events/{}/{}", self.resource, self.event)
    }
}

impl FromStr for Topic {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HostError::InvalidTopic(format!("\"{s}\" is not of the form resource:event"));

        let (resource, event) = s.split_once(':').ok_or_else(invalid)?;
        if event.contains(':') {
            return Err(invalid());
        }
        let (resource, event) = (resource.trim(), event.trim());
        if resource.is_empty() || event.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            resource: resource.to_string(),
            event: event.to_string(),
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.event)
    }
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => std::iter::once(first.to_ascii_uppercase()).chain(chars).collect(),
        None => String::new(),
    }
}

// ─── Router ─────────────────────────────────────────────────────────────

/// Routes one topic to exactly one plugin responder.
#[derive(Clone)]
pub struct EventRouter {
    ctx: PluginContext,
    handlers: Arc<HandlerTable>,
}

impl EventRouter {
    pub fn new(ctx: PluginContext, handlers: Arc<HandlerTable>) -> Self {
        Self { ctx, handlers }
    }

    /// Dispatch `message` to the responder derived from `topic`.
    ///
    /// Fails with `InvalidTopic` for malformed topics, `Configuration` when
    /// the plugin has not enabled the topic and `UnsupportedOperation` when
    /// no responder is registered. No handler runs in any of those cases.
    pub async fn dispatch(&self, topic: &str, message: Value) -> Result<(), HostError> {
        let topic: Topic = topic.parse()?;
        let plugin = self.ctx.code();

        if !self.ctx.config_source().is_enabled(&topic.config_path(plugin)) {
            return Err(HostError::Configuration(format!(
                "The plugin is not configured to respond to the topic \"{topic}\"."
            )));
        }

        let name = topic.handler_name();
        let handler = self.handlers.get_responder(&name).ok_or_else(|| {
            HostError::UnsupportedOperation(format!("The plugin method \"{name}\" is not callable."))
        })?;

        tracing::debug!(plugin = %plugin, topic = %topic, handler = %name, "dispatching topic");
        handler(self.ctx.clone(), message).await
    }
}
