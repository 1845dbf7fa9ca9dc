//! JSON-RPC 2.0 envelope and reply classification.
//!
//! The platform only exposes two RPC methods: `login` and `call`. Every other
//! operation travels as a parameter of `call`, together with the session token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the envelope that obtains a session token.
pub const LOGIN_METHOD: &str = "login";

/// Method name of the envelope that carries every other operation.
pub const CALL_METHOD: &str = "call";

/// Normalized error code the platform uses to signal an expired session.
pub const ERROR_SESSION_EXPIRED: i64 = 5;

/// Outbound request envelope. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl RpcEnvelope {
    /// `{"method":"login","params":[login, password]}`
    pub fn login(id: impl Into<String>, login: &str, password: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: LOGIN_METHOD.to_owned(),
            params: Value::Array(vec![
                Value::String(login.to_owned()),
                Value::String(password.to_owned()),
            ]),
        }
    }

    /// `{"method":"call","params":[token, method, args]}`
    pub fn call(id: impl Into<String>, token: &str, method: &str, args: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: CALL_METHOD.to_owned(),
            params: Value::Array(vec![
                Value::String(token.to_owned()),
                Value::String(method.to_owned()),
                args,
            ]),
        }
    }
}

/// Error object returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    pub code: i64,
    pub message: String,
}

impl RpcFault {
    /// Platform codes are offset into the JSON-RPC server error range:
    /// normalized = -code - 32000, saturating at the `i64` bounds.
    pub fn normalized_code(&self) -> i64 {
        self.code.saturating_neg().saturating_sub(32000)
    }

    pub fn is_session_expired(&self) -> bool {
        self.normalized_code() == ERROR_SESSION_EXPIRED
    }
}

/// A classified 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Result(Value),
    Fault(RpcFault),
}

impl RpcReply {
    /// Classify a response body.
    ///
    /// A non-null `error` wins over `result`. A body carrying neither key,
    /// or one that is not a JSON object, is a protocol violation.
    pub fn from_body(body: &[u8]) -> Result<Self, RpcError> {
        let invalid = || {
            RpcError::Protocol(format!(
                "Invalid response: {}",
                String::from_utf8_lossy(body)
            ))
        };

        let value: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
        let Value::Object(mut map) = value else {
            return Err(invalid());
        };

        match map.remove("error") {
            Some(Value::Null) | None => {}
            Some(err) => {
                let fault: RpcFault = serde_json::from_value(err).map_err(|e| {
                    RpcError::Protocol(format!("malformed error object: {e}"))
                })?;
                return Ok(RpcReply::Fault(fault));
            }
        }

        match map.remove("result") {
            Some(result) => Ok(RpcReply::Result(result)),
            None => Err(invalid()),
        }
    }
}
