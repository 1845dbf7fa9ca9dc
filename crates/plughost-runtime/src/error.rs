//! Host runtime error types.

use plughost_rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[error("multiple instantiation: {0}")]
    MultipleInstantiation(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("message bus error: {0}")]
    Bus(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl From<deadpool_redis::redis::RedisError> for HostError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        HostError::Bus(e.to_string())
    }
}

impl HostError {
    /// HTTP status a front-end should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            HostError::BadRequest(_) | HostError::InvalidTopic(_) => 400,
            HostError::Authentication(_) => 403,
            HostError::PluginNotFound(_) => 404,
            HostError::Processing(_) | HostError::UnsupportedOperation(_) => 409,
            _ => 500,
        }
    }

    /// Short kind name used by front-ends when reporting a failure.
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::Configuration(_) => "ConfigurationError",
            HostError::UnsupportedOperation(_) => "UnsupportedOperation",
            HostError::InvalidTopic(_) => "InvalidTopic",
            HostError::Authentication(_) => "AuthenticationError",
            HostError::Processing(_) => "ProcessingError",
            HostError::MultipleInstantiation(_) => "MultipleInstantiationError",
            HostError::PluginNotFound(_) => "PluginNotFound",
            HostError::BadRequest(_) => "BadRequest",
            HostError::Bus(_) => "MessageBusError",
            HostError::Rpc(e) => e.kind(),
            HostError::Io(_) => "IoError",
            HostError::Serialization(_) => "SerializationError",
            HostError::TomlParse(_) => "ConfigurationError",
        }
    }

    /// The error text without its category prefix, for `Kind: message` reports.
    pub fn message(&self) -> String {
        match self {
            HostError::Configuration(m)
            | HostError::UnsupportedOperation(m)
            | HostError::InvalidTopic(m)
            | HostError::Authentication(m)
            | HostError::Processing(m)
            | HostError::MultipleInstantiation(m)
            | HostError::PluginNotFound(m)
            | HostError::BadRequest(m)
            | HostError::Bus(m) => m.clone(),
            HostError::Rpc(e) => e.message(),
            HostError::Io(e) => e.to_string(),
            HostError::Serialization(e) => e.to_string(),
            HostError::TomlParse(e) => e.to_string(),
        }
    }

    /// Configuration problems are never retried, not even by the listener supervisor.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HostError::Configuration(_)
                | HostError::TomlParse(_)
                | HostError::Rpc(RpcError::Config(_))
        )
    }
}
