//! RPC client error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("session error: {0}")]
    SessionExpired(String),

    #[error("remote error: ({code}) {message}")]
    Remote { code: i64, message: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

impl RpcError {
    /// Short kind name used by front-ends when reporting a failure.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Config(_) => "ConfigurationError",
            RpcError::Transport(_) => "TransportError",
            RpcError::Protocol(_) => "ProtocolError",
            RpcError::SessionExpired(_) => "SessionError",
            RpcError::Remote { .. } => "RemoteError",
            RpcError::Cache(_) => "CacheError",
            RpcError::Io(_) => "IoError",
            RpcError::Serialization(_) => "SerializationError",
        }
    }

    /// The error text without its category prefix.
    pub fn message(&self) -> String {
        match self {
            RpcError::Config(m)
            | RpcError::Transport(m)
            | RpcError::Protocol(m)
            | RpcError::SessionExpired(m)
            | RpcError::Cache(m) => m.clone(),
            RpcError::Remote { code, message } => format!("({code}) {message}"),
            RpcError::Io(e) => e.to_string(),
            RpcError::Serialization(e) => e.to_string(),
        }
    }
}
