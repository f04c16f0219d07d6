use bytes::Bytes;
use chrono::Utc;
use futures_util::future;
use std::sync::Arc;

use toplist_middleware::{Cache, Transport};

use crate::config::PipelineConfig;
use crate::correlator::Correlator;
use crate::format::{self, OutputFormat};
use crate::merge;
use crate::messages::{RequestId, ServiceRequest};
use crate::Result;

/// Top-level orchestration: resolve the request id, check the cache, fan the
/// request out to every upstream service, await the correlated responses
/// concurrently, merge, cache, render.
///
/// Holds the process-wide broker and cache handles; construct one at startup
/// and share it across requests.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
    config: PipelineConfig,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn Cache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            config,
        }
    }

    /// Serve one client request, returning the rendered output.
    ///
    /// An explicit `timestamp` anchors the request to its minute and makes it
    /// cacheable; without one the request is "latest" and always fetches
    /// fresh data.
    pub async fn handle_request(
        &self,
        limit: usize,
        timestamp: Option<i64>,
        format: OutputFormat,
    ) -> Result<String> {
        let request_id = match timestamp {
            Some(ts) => RequestId::anchored(ts),
            None => RequestId::latest(Utc::now()),
        };

        let cached = if request_id.is_latest() {
            None
        } else {
            self.cache.get(&request_id.cache_key()).await?
        };

        let merged = match cached {
            Some(bytes) => {
                tracing::info!(key = %request_id.cache_key(), "cache hit");
                String::from_utf8(bytes.to_vec())?
            }
            None => {
                let merged = self.fanout(&request_id).await?;
                // A latest id rounds down to its minute only now, at store
                // time; the unrounded value stays on the wire.
                let key = request_id.cache_key();
                self.cache
                    .set(&key, Bytes::from(merged.clone()), self.config.cache_ttl)
                    .await?;
                tracing::info!(key = %key, "stored merged result");
                merged
            }
        };

        format::render(&merged, limit, format)
    }

    async fn fanout(&self, request_id: &RequestId) -> Result<String> {
        let correlator = Correlator::new(self.transport.clone(), self.config.correlation_timeout);
        let request = ServiceRequest::new(request_id);

        let mut pending = Vec::with_capacity(self.config.services.len());
        for service in &self.config.services {
            // Join the request-scoped response group before the request goes
            // out, so a fast response cannot land before the group exists
            // and slip past the blocking reads.
            self.transport
                .ensure_group(
                    &service.response_stream,
                    &correlator.response_group(service, request_id),
                )
                .await?;
            self.transport
                .append(&service.request_stream, &request.to_fields())
                .await?;
            tracing::debug!(
                service = %service.name,
                request_id = %request.request_id,
                "published service request"
            );
            pending.push(correlator.await_response(service, request_id));
        }

        // The first failure short-circuits and drops the sibling awaits.
        let joined = future::try_join_all(pending).await;

        // Best effort: drop the request-scoped groups now that the waits
        // have settled, matched or not.
        for service in &self.config.services {
            let group = correlator.response_group(service, request_id);
            if let Err(e) = self
                .transport
                .remove_group(&service.response_stream, &group)
                .await
            {
                tracing::debug!(service = %service.name, error = %e, "failed to drop response group");
            }
        }

        let payloads = joined?;
        merge::merge(&payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::error::Error;
    use std::time::Duration;
    use toplist_middleware::{InMemoryCache, InMemoryTransport};

    fn coordinator(
        transport: Arc<InMemoryTransport>,
        cache: Arc<InMemoryCache>,
        timeout: Duration,
    ) -> Coordinator {
        let config = PipelineConfig {
            services: vec![
                ServiceConfig::for_service("ranking"),
                ServiceConfig::for_service("pricing"),
            ],
            correlation_timeout: timeout,
            cache_ttl: None,
        };
        Coordinator::new(transport, cache, config)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fanout() {
        let transport = Arc::new(InMemoryTransport::new());
        let cache = Arc::new(InMemoryCache::new());
        let merged = r#"[{"Rank":1,"Symbol":"BTC","X":10}]"#;
        cache
            .set("1706000100", Bytes::from(merged), None)
            .await
            .unwrap();

        let coordinator = coordinator(transport.clone(), cache, Duration::from_millis(50));
        let body = coordinator
            .handle_request(10, Some(1706000130), OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(body, merged);

        // Nothing was published.
        assert_eq!(transport.len("ranking:requests").await.unwrap(), 0);
        assert_eq!(transport.len("pricing:requests").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_propagates() {
        let transport = Arc::new(InMemoryTransport::new());
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set("1706000100", Bytes::from("{not json"), None)
            .await
            .unwrap();

        let coordinator = coordinator(transport, cache, Duration::from_millis(50));
        let err = coordinator
            .handle_request(10, Some(1706000100), OutputFormat::Json)
            .await;
        assert!(matches!(err, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let transport = Arc::new(InMemoryTransport::new());
        let cache = Arc::new(InMemoryCache::new());

        let coordinator = coordinator(transport.clone(), cache, Duration::from_millis(50));
        let err = coordinator.handle_request(10, None, OutputFormat::Json).await;
        assert!(matches!(err, Err(Error::CorrelationTimeout { .. })));

        // Requests still went out to both services before the wait expired.
        assert_eq!(transport.len("ranking:requests").await.unwrap(), 1);
        assert_eq!(transport.len("pricing:requests").await.unwrap(), 1);
    }
}
