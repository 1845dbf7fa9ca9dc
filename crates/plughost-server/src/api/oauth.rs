//! `GET /oauth`: thin pass-through to the plugin's OAuth hooks.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use plughost_runtime::HostError;
use serde::Serialize;

use super::{ensure_plugin, normalize_query, ApiError, SharedHost};

#[derive(Debug, Serialize)]
pub struct OauthStatus {
    pub plugin: String,
    pub connect_url: String,
}

/// `action=redirect` completes an authorization, `action=disconnect` revokes
/// it; both then send the browser back to the plugin's connect URL.
pub async fn oauth(
    State(host): State<SharedHost>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    ensure_plugin(&host, &query)?;
    let action = query.get("action").cloned();
    let params = normalize_query(query);

    match action.as_deref() {
        Some("redirect") => host.oauth_handle_redirect(&params).await?,
        Some("disconnect") => host.oauth_disconnect(&params).await?,
        Some(other) => {
            return Err(HostError::BadRequest(format!("unknown OAuth action \"{other}\"")).into())
        }
        None => {
            let connect_url = host.oauth_get_url(&params).await?;
            return Ok(Json(OauthStatus {
                plugin: host.code().to_string(),
                connect_url,
            })
            .into_response());
        }
    }

    let location = host.oauth_get_url(&params).await?;
    tracing::info!(plugin = %host.code(), action = ?action, "oauth action completed");
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}
