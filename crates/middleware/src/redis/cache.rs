use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::CacheError;

pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        // Test connection
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        tracing::info!("Connected to Redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        tracing::debug!(key, found = value.is_some(), "GET");
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value.as_ref(), ttl.as_secs())
                    .await
                    .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
                tracing::debug!(key, ttl_secs = ttl.as_secs(), "SET with TTL");
            }
            None => {
                conn.set::<_, _, ()>(key, value.as_ref())
                    .await
                    .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
                tracing::debug!(key, "SET");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        tracing::debug!(key, "DEL");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        Ok(exists)
    }
}
