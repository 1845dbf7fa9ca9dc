//! `ANY /rpc/{method}`: shared-secret callbacks into the plugin.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use plughost_runtime::{HostError, WebhookRequest};
use serde_json::Value;

use super::{ensure_plugin, normalize_headers, normalize_query, sized_response, ApiError, SharedHost};

pub async fn callback(
    State(host): State<SharedHost>,
    Path(method): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ensure_plugin(&host, &query)?;

    // `secret_key` stays in the query: the host checks it.
    let request = WebhookRequest::new(normalize_query(query), normalize_headers(&headers), body);

    let result = host.invoke_rpc(&method, request).await?;
    let body = match result {
        Value::Null => Bytes::new(),
        other => Bytes::from(serde_json::to_vec(&other).map_err(HostError::from)?),
    };
    let content_type = (!body.is_empty()).then_some("application/json");
    Ok(sized_response(StatusCode::OK, body, content_type))
}
