//! HTTP front-end for one hosted plugin.

pub mod callback;
pub mod oauth;
pub mod respond;
pub mod webhook;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use bytes::Bytes;
use plughost_runtime::{HostError, PluginHost, QueryMap};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub type SharedHost = Arc<PluginHost>;

/// Query keys consumed by the front-end and never passed to plugins.
pub const FRAMEWORK_KEYS: [&str; 4] = ["plugin", "debug", "action", "method"];

/// Headers dropped before a request reaches plugin code.
const DROPPED_HEADERS: [&str; 2] = ["host", "x-forwarded-for"];

pub fn router(host: SharedHost) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", any(webhook::webhook))
        .route("/respond", post(respond::respond))
        .route("/rpc/{method}", any(callback::callback))
        .route("/oauth", get(oauth::oauth))
        .layer(TraceLayer::new_for_http())
        .with_state(host)
}

// ─── Errors ─────────────────────────────────────────────────────────────

/// Maps a [`HostError`] to its status with an empty body.
#[derive(Debug)]
pub struct ApiError(pub HostError);

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "request failed: {}", self.0);
        } else {
            tracing::warn!(kind = self.0.kind(), "request rejected: {}", self.0);
        }
        status.into_response()
    }
}

// ─── Request normalization ──────────────────────────────────────────────

/// A `plugin` query parameter must name the hosted plugin, if present.
pub(crate) fn ensure_plugin(host: &PluginHost, query: &HashMap<String, String>) -> Result<(), ApiError> {
    match query.get("plugin") {
        Some(name) if name != host.code() => Err(HostError::PluginNotFound(format!(
            "The plugin \"{name}\" is not hosted here."
        ))
        .into()),
        _ => Ok(()),
    }
}

pub fn normalize_query(query: HashMap<String, String>) -> QueryMap {
    query
        .into_iter()
        .filter(|(k, _)| !FRAMEWORK_KEYS.contains(&k.as_str()))
        .collect()
}

pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !DROPPED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Response with an explicit `Content-Length` that closes the connection afterwards.
pub(crate) fn sized_response(status: StatusCode, body: Bytes, content_type: Option<&'static str>) -> Response {
    let length = body.len();
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    if let Some(ct) = content_type {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
    } else {
        headers.remove(header::CONTENT_TYPE);
    }
    response
}

// ─── Health ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    plugin: String,
    version: &'static str,
}

async fn health(axum::extract::State(host): axum::extract::State<SharedHost>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        plugin: host.code().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
