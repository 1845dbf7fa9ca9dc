//! Pub/sub subscription loop.
//!
//! The listener subscribes to `<command>:*` and feeds every message, in
//! delivery order and one at a time, to the [`EventRouter`]. Per-message
//! failures are logged and skipped; only a lost subscription ends a run, and
//! [`listen_forever`] turns that into a fixed-delay resubscribe.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::{ConfigSource, PUBSUB_ACTIVE, PUBSUB_COMMAND, PUBSUB_SERVER, PUBSUB_TIMEOUT};
use crate::error::HostError;
use crate::events::EventRouter;

pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Wait between a lost subscription and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

// ─── Settings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubSettings {
    pub host: String,
    pub port: u16,
    pub command: String,
    /// Connect timeout in seconds; `0` waits indefinitely.
    pub timeout_secs: u64,
}

impl PubSubSettings {
    /// Read `middleware/pubsub/*`. Fails before any connection attempt when
    /// the feature is off or host/command are missing.
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self, HostError> {
        if !config.is_enabled(PUBSUB_ACTIVE) {
            return Err(HostError::Configuration(
                "The pub/sub feature is not active.".into(),
            ));
        }

        let server = config.get(PUBSUB_SERVER).unwrap_or_default();
        let (host, port) = match server.split_once(':') {
            Some((h, p)) => (h.trim(), Some(p.trim())),
            None => (server.trim(), None),
        };
        if host.is_empty() {
            return Err(HostError::Configuration(
                "The pub/sub host is not configured.".into(),
            ));
        }
        let port = match port.filter(|p| !p.is_empty()) {
            Some(p) => p.parse().map_err(|_| {
                HostError::Configuration(format!("The pub/sub port \"{p}\" is not valid."))
            })?,
            None => DEFAULT_REDIS_PORT,
        };

        let command = config.get(PUBSUB_COMMAND).unwrap_or_default().trim().to_string();
        if command.is_empty() {
            return Err(HostError::Configuration(
                "The pub/sub command is not configured.".into(),
            ));
        }

        let timeout_secs = config
            .get(PUBSUB_TIMEOUT)
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(0);

        Ok(Self {
            host: host.to_string(),
            port,
            command,
            timeout_secs,
        })
    }

    pub fn pattern(&self) -> String {
        format!("{}:*", self.command)
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

// ─── Message bus ────────────────────────────────────────────────────────

/// One delivered message: the full channel name and the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Source of subscription messages. `None` means the subscription is gone.
#[async_trait]
pub trait MessageBus: Send {
    async fn next_message(&mut self) -> Option<BusMessage>;
}

/// Redis pattern subscription.
pub struct RedisBus {
    messages: BoxStream<'static, redis::Msg>,
}

impl RedisBus {
    pub async fn subscribe(settings: &PubSubSettings) -> Result<Self, HostError> {
        let client = redis::Client::open(settings.url())?;
        let pattern = settings.pattern();

        let connect = async {
            let mut pubsub = client.get_async_pubsub().await?;
            pubsub.psubscribe(&pattern).await?;
            Ok::<_, HostError>(pubsub)
        };
        let pubsub = if settings.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(settings.timeout_secs), connect)
                .await
                .map_err(|_| {
                    HostError::Bus(format!(
                        "timed out connecting to {}:{}",
                        settings.host, settings.port
                    ))
                })??
        } else {
            connect.await?
        };

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            pattern = %pattern,
            "subscribed to pub/sub"
        );
        Ok(Self {
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn next_message(&mut self) -> Option<BusMessage> {
        let msg = self.messages.next().await?;
        Some(BusMessage::new(msg.get_channel_name(), msg.get_payload_bytes()))
    }
}

/// In-process bus fed through an mpsc sender.
pub struct ChannelBus {
    rx: mpsc::Receiver<BusMessage>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> (mpsc::Sender<BusMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn next_message(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

// ─── Listener ───────────────────────────────────────────────────────────

/// Topic part of `<routingKey>:<resource>:<event>`.
pub fn topic_from_channel(channel: &str) -> Option<&str> {
    channel.split_once(':').map(|(_, topic)| topic.trim())
}

pub struct PubSubListener {
    router: EventRouter,
}

impl PubSubListener {
    pub fn new(router: EventRouter) -> Self {
        Self { router }
    }

    /// Consume `bus` until the subscription ends. Never returns `Ok`.
    pub async fn run_with<B: MessageBus + ?Sized>(
        &self,
        bus: &mut B,
    ) -> Result<Infallible, HostError> {
        while let Some(message) = bus.next_message().await {
            if let Err(e) = self.handle_message(&message).await {
                tracing::error!(
                    channel = %message.channel,
                    kind = e.kind(),
                    "pub/sub message failed: {e}"
                );
            }
        }
        Err(HostError::Bus("the pub/sub subscription was closed".into()))
    }

    /// Connect with `settings` and consume until the subscription ends.
    pub async fn run(&self, settings: &PubSubSettings) -> Result<Infallible, HostError> {
        let mut bus = RedisBus::subscribe(settings).await?;
        self.run_with(&mut bus).await
    }

    /// Decode and dispatch one message.
    pub async fn handle_message(&self, message: &BusMessage) -> Result<(), HostError> {
        let topic = topic_from_channel(&message.channel).ok_or_else(|| {
            HostError::InvalidTopic(format!("channel \"{}\" carries no topic", message.channel))
        })?;
        let body: Value = serde_json::from_slice(&message.payload)?;
        self.router.dispatch(topic, body).await
    }
}

/// Run `run_once` again `delay` after every failure, forever. Only a
/// configuration error stops the loop, and it is returned.
pub async fn listen_forever<F, Fut>(mut run_once: F, delay: Duration) -> HostError
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Infallible, HostError>>,
{
    loop {
        match run_once().await {
            Ok(never) => match never {},
            Err(e) if e.is_configuration() => return e,
            Err(e) => {
                tracing::error!(
                    kind = e.kind(),
                    "pub/sub listener stopped: {e}; resubscribing in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
