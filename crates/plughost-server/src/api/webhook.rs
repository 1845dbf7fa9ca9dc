//! `ANY /webhook`: verify, acknowledge, process.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use plughost_runtime::WebhookRequest;

use super::{ensure_plugin, normalize_headers, normalize_query, sized_response, ApiError, SharedHost};

/// Answers as soon as the plugin acknowledges (or fails before doing so).
/// Processing after an early acknowledge continues in the background.
pub async fn webhook(
    State(host): State<SharedHost>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ensure_plugin(&host, &query)?;
    let request = WebhookRequest::new(normalize_query(query), normalize_headers(&headers), body);

    let outcome = host.handle_webhook(request).await;
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        tracing::warn!(plugin = %host.code(), status = outcome.status, "webhook rejected");
    }
    Ok(sized_response(status, outcome.body, None))
}
