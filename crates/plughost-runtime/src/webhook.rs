//! Inbound webhook protocol: verify, acknowledge early, keep processing.
//!
//! The HTTP front-end cannot write a response while its handler is still
//! running, so processing runs on its own task and the front-end only waits
//! for the [`WebhookAck`] latch to fire. The latch fires once: on explicit
//! early acknowledge from the plugin, on automatic acknowledge after a
//! successful handle, or on rejection before either of those.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::context::PluginContext;
use crate::error::HostError;
use crate::plugin::Plugin;

/// One inbound request as plugins see it. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(
        query: BTreeMap<String, String>,
        headers: BTreeMap<String, String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            query,
            headers,
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// The single response sent back to the webhook caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Bytes,
}

impl WebhookResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }
}

// ─── Acknowledge latch ──────────────────────────────────────────────────

/// Response buffer plus the one-shot latch that releases it.
pub struct WebhookAck {
    buffer: Mutex<Vec<u8>>,
    fired: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<WebhookResponse>>>,
}

impl std::fmt::Debug for WebhookAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAck")
            .field("acknowledged", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WebhookAck {
    /// A latch wired to a receiver that gets the response when it fires.
    pub fn channel() -> (Self, oneshot::Receiver<WebhookResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                buffer: Mutex::new(Vec::new()),
                fired: AtomicBool::new(false),
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// A latch with nobody listening, for running the protocol inline.
    pub fn detached() -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            fired: AtomicBool::new(false),
            sender: Mutex::new(None),
        }
    }

    /// Append to the response body. Ignored once the response is sent.
    pub fn write(&self, chunk: &[u8]) {
        if !self.is_acknowledged() {
            lock(&self.buffer).extend_from_slice(chunk);
        }
    }

    /// Send `200` with the buffered body. Returns `false` when the latch had
    /// already fired, in which case nothing is sent.
    pub fn acknowledge(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let body = std::mem::take(&mut *lock(&self.buffer));
        self.send(WebhookResponse {
            status: 200,
            body: Bytes::from(body),
        });
        true
    }

    /// Send an error status with an empty body, discarding buffered output.
    /// Returns `false` when a response already went out.
    pub fn reject(&self, status: u16) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        lock(&self.buffer).clear();
        self.send(WebhookResponse::empty(status));
        true
    }

    pub fn is_acknowledged(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn send(&self, response: WebhookResponse) {
        if let Some(tx) = lock(&self.sender).take() {
            // The receiver is gone when the caller hung up; that is not an error here.
            let _ = tx.send(response);
        }
    }
}

// ─── Responder ──────────────────────────────────────────────────────────

/// Drives `Received → Verified → Acknowledged → Processed` for one plugin.
#[derive(Clone)]
pub struct WebhookResponder {
    plugin: Arc<dyn Plugin>,
    ctx: PluginContext,
}

impl WebhookResponder {
    pub fn new(plugin: Arc<dyn Plugin>, ctx: PluginContext) -> Self {
        Self { plugin, ctx }
    }

    /// Run the whole protocol on the current task.
    ///
    /// Verification failure rejects with `403` and never calls the handler.
    /// A handling failure rejects with its status when the caller has not
    /// been answered yet; after an early acknowledge it can only be logged.
    pub async fn process(&self, request: &WebhookRequest, ack: &WebhookAck) -> Result<(), HostError> {
        let verified = match self.plugin.verify_webhook(&self.ctx, request).await {
            Ok(v) => v,
            Err(e) => {
                ack.reject(e.status_code());
                return Err(e);
            }
        };
        if !verified {
            ack.reject(403);
            return Err(HostError::Authentication(
                "Webhook request not authenticated.".into(),
            ));
        }

        let outcome = match self.plugin.handle_webhook(&self.ctx, request, ack).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(HostError::Processing("Webhook request failed.".into())),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                ack.acknowledge();
                Ok(())
            }
            Err(e) => {
                if !ack.reject(e.status_code()) {
                    tracing::error!(
                        plugin = %self.ctx.code(),
                        "webhook processing failed after acknowledge: {e}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Process on a spawned task and return as soon as the caller can be
    /// answered. Work after an early acknowledge keeps running.
    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        let (ack, rx) = WebhookAck::channel();
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = this.process(&request, &ack).await {
                tracing::warn!(plugin = %this.ctx.code(), kind = e.kind(), "webhook failed: {e}");
            }
        });

        match rx.await {
            Ok(response) => response,
            Err(_) => {
                // Sender dropped without firing: the processing task panicked.
                tracing::error!(plugin = %self.ctx.code(), "webhook task ended without a response");
                WebhookResponse::empty(500)
            }
        }
    }
}
