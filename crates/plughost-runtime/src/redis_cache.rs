//! Redis-backed cache, selected with `middleware/cache/backend = "redis"`.

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use plughost_rpc::cache::effective_lifetime;
use plughost_rpc::{Cache, RpcError};
use serde_json::Value;

pub const KEY_PREFIX: &str = "plughost:cache:";

/// Shares entries between every process pointed at the same server.
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// `server` is `host[:port]`. The pool connects lazily.
    pub fn connect(server: &str) -> Result<Self, RpcError> {
        let server = server.trim();
        if server.is_empty() {
            return Err(RpcError::Config(
                "Configuration parameter 'middleware/cache/server' is required.".into(),
            ));
        }
        let url = if server.starts_with("redis://") {
            server.to_string()
        } else {
            format!("redis://{server}/")
        };
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RpcError::Cache(format!("cannot create redis pool: {e}")))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, RpcError> {
        self.pool
            .get()
            .await
            .map_err(|e| RpcError::Cache(format!("redis unavailable: {e}")))
    }
}

fn full_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

fn redis_err(e: deadpool_redis::redis::RedisError) -> RpcError {
    RpcError::Cache(format!("redis error: {e}"))
}

#[async_trait]
impl Cache for RedisCache {
    async fn load(&self, key: &str) -> Result<Option<Value>, RpcError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(full_key(key)).await.map_err(redis_err)?;
        match raw {
            Some(s) => match serde_json::from_str(&s) {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    tracing::warn!(key = %key, "discarding corrupt cache entry: {e}");
                    let _: () = conn.del(full_key(key)).await.map_err(redis_err)?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &Value, lifetime: Option<u64>) -> Result<(), RpcError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        match effective_lifetime(lifetime) {
            0 => conn.set::<_, _, ()>(full_key(key), payload).await,
            ttl => conn.set_ex::<_, _, ()>(full_key(key), payload, ttl).await,
        }
        .map_err(redis_err)
    }

    async fn remove(&self, key: &str) -> Result<(), RpcError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(full_key(key)).await.map_err(redis_err)
    }
}
