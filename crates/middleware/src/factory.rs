use std::str::FromStr;
use std::sync::Arc;

use crate::cache::Cache;
use crate::error::{CacheError, TransportError};
use crate::memory::{InMemoryCache, InMemoryTransport};
use crate::redis::{RedisCache, RedisTransport};
use crate::transport::Transport;

/// Which backend pair to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Redis,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            other => Err(format!("unknown backend '{other}' (expected 'memory' or 'redis')")),
        }
    }
}

/// Error creating middleware
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Factory for creating middleware instances based on configuration
pub struct MiddlewareFactory;

impl MiddlewareFactory {
    pub async fn create_transport(
        kind: BackendKind,
        redis_url: &str,
    ) -> Result<Arc<dyn Transport>, FactoryError> {
        match kind {
            BackendKind::Memory => Ok(Arc::new(InMemoryTransport::new())),
            BackendKind::Redis => Ok(Arc::new(RedisTransport::connect(redis_url).await?)),
        }
    }

    pub async fn create_cache(
        kind: BackendKind,
        redis_url: &str,
    ) -> Result<Arc<dyn Cache>, FactoryError> {
        match kind {
            BackendKind::Memory => Ok(Arc::new(InMemoryCache::new())),
            BackendKind::Redis => Ok(Arc::new(RedisCache::connect(redis_url).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("Redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert!("kafka".parse::<BackendKind>().is_err());
    }

    #[tokio::test]
    async fn test_create_memory_backends() {
        let transport = MiddlewareFactory::create_transport(BackendKind::Memory, "")
            .await
            .unwrap();
        let cache = MiddlewareFactory::create_cache(BackendKind::Memory, "")
            .await
            .unwrap();
        drop(transport);
        drop(cache);
    }
}
