//! JSON-RPC session client.
//!
//! State machine: `NoSession → LoggingIn → Ready → (expiry signal) → NoSession`.
//! The session slot is guarded by an async mutex that stays held for the whole
//! login exchange, so concurrent calls on one client wait for a single login
//! instead of starting their own.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::envelope::{RpcEnvelope, RpcReply, JSONRPC_VERSION, LOGIN_METHOD};
use crate::error::RpcError;
use crate::trace::RequestTrace;

/// Lifetime of a cached session token (1 hour).
pub const SESSION_LIFETIME_SECS: u64 = 3600;

/// Client-side request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Deterministic session cache key for an (endpoint, login) pair.
pub fn session_cache_key(base_url: &str, login: &str) -> String {
    format!("{:x}", md5::compute(format!("sessionId-{base_url}-{login}")))
}

// ─── Configuration ──────────────────────────────────────────────────────

/// Connection settings for the remote platform.
#[derive(Clone)]
pub struct RpcConfig {
    pub base_url: String,
    pub login: String,
    pub password: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl std::fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfig")
            .field("base_url", &self.base_url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RpcConfig {
    /// Validate and build settings. Every credential is required; missing or
    /// blank values fail before any network I/O.
    pub fn new(
        base_url: Option<String>,
        login: Option<String>,
        password: Option<String>,
    ) -> Result<Self, RpcError> {
        fn required(name: &str, value: Option<String>) -> Result<String, RpcError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => Err(RpcError::Config(format!(
                    "Configuration parameter '{name}' is required."
                ))),
            }
        }

        Ok(Self {
            base_url: required("base_url", base_url)?,
            login: required("login", login)?,
            password: required("password", password)?,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: "plughost".to_string(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// ─── Session state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// Nothing known yet; the cache may hold a token from an earlier process.
    Unknown,
    /// The platform rejected the last token; the cache must be bypassed.
    Cleared,
    Ready(String),
}

// ─── Client ─────────────────────────────────────────────────────────────

/// JSON-RPC client bound to one platform endpoint and one login.
pub struct RpcClient {
    config: RpcConfig,
    http: reqwest::Client,
    cache: Arc<dyn Cache>,
    cache_key: String,
    session: Mutex<SessionState>,
    trace: Option<RequestTrace>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("config", &self.config)
            .field("tracing", &self.trace.is_some())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Build a client. The HTTP client keeps one idle keep-alive connection
    /// to the platform and applies the configured timeout to every request.
    pub fn new(config: RpcConfig, cache: Arc<dyn Cache>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(1)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        let cache_key = session_cache_key(&config.base_url, &config.login);

        Ok(Self {
            config,
            http,
            cache,
            cache_key,
            session: Mutex::new(SessionState::Unknown),
            trace: None,
        })
    }

    /// Record every exchange in the given trace log.
    pub fn with_trace(mut self, trace: RequestTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Cache key under which the session token is persisted.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Seed the session token, skipping the cache lookup and login.
    pub async fn set_session_token(&self, token: impl Into<String>) {
        *self.session.lock().await = SessionState::Ready(token.into());
    }

    /// Current in-process token, if one is held.
    pub async fn session_token(&self) -> Option<String> {
        match &*self.session.lock().await {
            SessionState::Ready(t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Call a platform method, re-authenticating once on session expiry.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, RpcError> {
        self.call_with_retry(method, args, true).await
    }

    /// Call a platform method.
    ///
    /// With `allow_retry`, a session-expired fault clears the session, forces
    /// a fresh login and repeats the call exactly once. A second expiry (or
    /// any expiry without `allow_retry`) fails with
    /// [`RpcError::SessionExpired`].
    pub async fn call_with_retry(
        &self,
        method: &str,
        args: Value,
        allow_retry: bool,
    ) -> Result<Value, RpcError> {
        if method == LOGIN_METHOD {
            let envelope = RpcEnvelope {
                jsonrpc: JSONRPC_VERSION.to_owned(),
                id: next_id(),
                method: LOGIN_METHOD.to_owned(),
                params: args,
            };
            return match self.send(LOGIN_METHOD, &envelope).await? {
                RpcReply::Result(v) => Ok(v),
                RpcReply::Fault(fault) if fault.is_session_expired() => Err(
                    RpcError::SessionExpired(format!("({}) {}", fault.normalized_code(), fault.message)),
                ),
                RpcReply::Fault(fault) => Err(RpcError::Remote {
                    code: fault.normalized_code(),
                    message: fault.message,
                }),
            };
        }

        let mut retry_available = allow_retry;
        loop {
            let token = self.ensure_session().await?;
            let envelope = RpcEnvelope::call(next_id(), &token, method, args.clone());

            match self.send(method, &envelope).await? {
                RpcReply::Result(v) => return Ok(v),
                RpcReply::Fault(fault) if fault.is_session_expired() => {
                    self.invalidate(&token).await;
                    if retry_available {
                        retry_available = false;
                        tracing::info!(method = %method, "session expired, logging in again");
                        continue;
                    }
                    return Err(RpcError::SessionExpired(format!(
                        "({}) {}",
                        fault.normalized_code(),
                        fault.message
                    )));
                }
                RpcReply::Fault(fault) => {
                    return Err(RpcError::Remote {
                        code: fault.normalized_code(),
                        message: fault.message,
                    });
                }
            }
        }
    }

    /// Return a usable token, logging in if needed. Holds the session lock for
    /// the duration of any login so only one is ever in flight.
    async fn ensure_session(&self) -> Result<String, RpcError> {
        let mut state = self.session.lock().await;

        match &*state {
            SessionState::Ready(token) => return Ok(token.clone()),
            SessionState::Unknown => match self.cache.load(&self.cache_key).await {
                Ok(Some(Value::String(token))) if !token.is_empty() => {
                    tracing::debug!("reusing cached session token");
                    *state = SessionState::Ready(token.clone());
                    return Ok(token);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("failed to read cached session: {e}"),
            },
            SessionState::Cleared => {}
        }

        let token = self.login().await?;
        if let Err(e) = self
            .cache
            .save(
                &self.cache_key,
                &Value::String(token.clone()),
                Some(SESSION_LIFETIME_SECS),
            )
            .await
        {
            tracing::warn!("failed to persist session token: {e}");
        }
        *state = SessionState::Ready(token.clone());
        Ok(token)
    }

    /// Forced, non-retryable login exchange.
    async fn login(&self) -> Result<String, RpcError> {
        tracing::debug!(login = %self.config.login, "logging in to platform");
        let envelope = RpcEnvelope::login(next_id(), &self.config.login, &self.config.password);

        match self.send(LOGIN_METHOD, &envelope).await? {
            RpcReply::Result(Value::String(token)) if !token.is_empty() => Ok(token),
            RpcReply::Result(other) => Err(RpcError::Protocol(format!(
                "login returned no session token: {other}"
            ))),
            RpcReply::Fault(fault) if fault.is_session_expired() => Err(RpcError::SessionExpired(
                format!("({}) {}", fault.normalized_code(), fault.message),
            )),
            RpcReply::Fault(fault) => Err(RpcError::Remote {
                code: fault.normalized_code(),
                message: fault.message,
            }),
        }
    }

    /// Drop a rejected token. A token another caller already replaced is left alone.
    async fn invalidate(&self, stale: &str) {
        let mut state = self.session.lock().await;
        if let SessionState::Ready(current) = &*state {
            if current != stale {
                return;
            }
        }
        *state = SessionState::Cleared;
        if let Err(e) = self.cache.remove(&self.cache_key).await {
            tracing::warn!("failed to clear cached session: {e}");
        }
    }

    /// POST one envelope and classify the reply.
    async fn send(&self, label: &str, envelope: &RpcEnvelope) -> Result<RpcReply, RpcError> {
        let body = serde_json::to_string(envelope)?;

        if let Some(trace) = &self.trace {
            trace
                .record_request(
                    label,
                    &self.config.base_url,
                    &[
                        ("Content-Type", JSON_CONTENT_TYPE),
                        ("Accept", JSON_CONTENT_TYPE),
                        ("User-Agent", &self.config.user_agent),
                    ],
                    &body,
                )
                .await;
        }

        let result = self
            .http
            .post(&self.config.base_url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                if let Some(trace) = &self.trace {
                    trace.record_failure(label, &e.to_string()).await;
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                if let Some(trace) = &self.trace {
                    trace.record_failure(label, &e.to_string()).await;
                }
                return Err(e.into());
            }
        };

        if let Some(trace) = &self.trace {
            trace.record_response(label, status, &headers, &bytes).await;
        }

        if !status.is_success() {
            return Err(RpcError::Transport(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }

        RpcReply::from_body(&bytes)
    }
}

/// Correlation id; only needs to be traceable within this process.
fn next_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn config() -> RpcConfig {
        RpcConfig::new(
            Some("http://platform.test/api".into()),
            Some("api-user".into()),
            Some("s3cret".into()),
        )
        .unwrap()
    }

    // ── Configuration ─────────────────────────────────────────────────

    #[test]
    fn test_missing_parameters_fail_fast() {
        let err = RpcConfig::new(None, Some("u".into()), Some("p".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: Configuration parameter 'base_url' is required."
        );

        let err = RpcConfig::new(Some("http://x".into()), Some("  ".into()), Some("p".into()))
            .unwrap_err();
        assert!(err.to_string().contains("'login'"));

        let err = RpcConfig::new(Some("http://x".into()), Some("u".into()), None).unwrap_err();
        assert!(err.to_string().contains("'password'"));
    }

    #[test]
    fn test_config_defaults() {
        let cfg = config();
        assert_eq!(cfg.timeout_secs, 20);
        assert_eq!(cfg.user_agent, "plughost");
    }

    #[test]
    fn test_debug_redacts_password() {
        let printed = format!("{:?}", config());
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("<redacted>"));
    }

    // ── Session key ───────────────────────────────────────────────────

    #[test]
    fn test_session_cache_key_is_stable_md5() {
        let key = session_cache_key("http://platform.test/api", "api-user");
        assert_eq!(key.len(), 32);
        assert_eq!(key, session_cache_key("http://platform.test/api", "api-user"));
        assert_ne!(key, session_cache_key("http://platform.test/api", "other"));
        assert_eq!(
            session_cache_key("", ""),
            format!("{:x}", md5::compute("sessionId--"))
        );
    }

    // ── Session state ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_seeded_token_is_reported() {
        let client = RpcClient::new(config(), Arc::new(MemoryCache::new())).unwrap();
        assert_eq!(client.session_token().await, None);
        client.set_session_token("tok").await;
        assert_eq!(client.session_token().await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_invalidate_ignores_replaced_token() {
        let client = RpcClient::new(config(), Arc::new(MemoryCache::new())).unwrap();
        client.set_session_token("fresh").await;
        client.invalidate("stale").await;
        assert_eq!(client.session_token().await.as_deref(), Some("fresh"));

        client.invalidate("fresh").await;
        assert_eq!(client.session_token().await, None);
    }
}
