//! toplist-middleware: pluggable broker and cache abstractions
//!
//! Provides trait-based abstractions for the append-only stream transport and
//! the key-value cache, with in-memory implementations for testing and Redis
//! implementations for production.

pub mod cache;
pub mod error;
pub mod factory;
pub mod memory;
pub mod redis;
pub mod transport;

pub use cache::Cache;
pub use error::{CacheError, TransportError};
pub use factory::{BackendKind, MiddlewareFactory};
pub use memory::{InMemoryCache, InMemoryTransport};
pub use self::redis::{RedisCache, RedisTransport};
pub use transport::{StreamMessage, StreamPosition, Transport};
