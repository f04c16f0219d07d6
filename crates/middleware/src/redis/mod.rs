//! Redis-backed implementations: streams for the transport, string keys for
//! the cache.
pub mod cache;
pub mod transport;

pub use cache::RedisCache;
pub use transport::RedisTransport;
