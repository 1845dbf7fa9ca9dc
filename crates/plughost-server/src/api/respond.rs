//! `POST /respond`: deliver a topic message over HTTP instead of pub/sub.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use bytes::Bytes;
use plughost_runtime::HostError;
use serde_json::Value;

use super::{ensure_plugin, ApiError, SharedHost};

pub async fn respond(
    State(host): State<SharedHost>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    ensure_plugin(&host, &query)?;
    let (topic, message) = parse_body(&body)?;
    host.dispatch_topic(&topic, message).await?;
    Ok(StatusCode::OK)
}

fn parse_body(body: &[u8]) -> Result<(String, Value), HostError> {
    let decoded: Value = serde_json::from_slice(body)
        .map_err(|_| HostError::BadRequest("json decode error".into()))?;
    let Value::Object(mut fields) = decoded else {
        return Err(HostError::BadRequest("json decode error".into()));
    };

    let topic = match fields.remove("topic") {
        Some(Value::String(t)) if !t.trim().is_empty() => t,
        _ => return Err(HostError::BadRequest("topic not specified".into())),
    };
    let message = match fields.remove("message") {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) if m.is_empty() => None,
        Some(Value::Array(a)) if a.is_empty() => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(other) => Some(other),
    }
    .ok_or_else(|| HostError::BadRequest("message not specified".into()))?;

    Ok((topic, message))
}
