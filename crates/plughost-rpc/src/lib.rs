//! JSON-RPC session client for plughost plugins.
//!
//! Plugins talk to the remote platform through a single fixed JSON-RPC 2.0
//! envelope over HTTP. The client owns the session token, persists it in a
//! cache across process invocations, re-authenticates once when the platform
//! reports an expired session, and can record full request/response traces.

pub mod cache;
pub mod client;
pub mod envelope;
pub mod error;
pub mod trace;

pub use cache::{Cache, FileCache, MemoryCache, DEFAULT_CACHE_LIFETIME_SECS};
pub use client::{session_cache_key, RpcClient, RpcConfig, SESSION_LIFETIME_SECS};
pub use envelope::{RpcEnvelope, RpcFault, RpcReply, ERROR_SESSION_EXPIRED};
pub use error::RpcError;
pub use trace::RequestTrace;
