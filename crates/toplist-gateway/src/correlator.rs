use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use toplist_middleware::{StreamPosition, Transport};

use crate::config::ServiceConfig;
use crate::error::Error;
use crate::messages::{RequestId, ServiceResponse};
use crate::Result;

/// Matches one service's asynchronous response to a request id.
///
/// Responses may already be sitting in the stream from before this wait
/// began, so every wait starts with a bounded scan of the current backlog
/// before falling back to blocking group reads. A non-matching message read
/// during the backlog scan predates every in-flight request and is purged as
/// stale garbage. The blocking reads go through a consumer group scoped to
/// the request id, so concurrent waits each see every new message: a
/// non-match is simply left in place for the request that owns it, and the
/// next read suspends until genuinely new messages arrive.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    /// Process-unique token disambiguating this correlator's groups from any
    /// concurrent request that happens to carry the same wire id.
    token: u64,
}

static WAIT_TOKEN: AtomicU64 = AtomicU64::new(0);

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            token: WAIT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Consumer group for this correlator's wait on one service, scoped by
    /// the request id and wait token so concurrent requests never compete
    /// for each other's deliveries.
    pub fn response_group(&self, service: &ServiceConfig, request_id: &RequestId) -> String {
        format!("{}:{}:{}", service.group, request_id.wire(), self.token)
    }

    /// Wait for the response matching `request_id` on the service's response
    /// stream, returning its data payload. Fails with
    /// [`Error::CorrelationTimeout`] when the deadline passes first.
    pub async fn await_response(
        &self,
        service: &ServiceConfig,
        request_id: &RequestId,
    ) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.correlate(service, request_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CorrelationTimeout {
                service: service.name.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn correlate(&self, service: &ServiceConfig, request_id: &RequestId) -> Result<String> {
        let stream = &service.response_stream;

        // Backlog scan, bounded by the stream length at entry.
        let backlog = self.transport.len(stream).await?;
        for _ in 0..backlog {
            let batch = self
                .transport
                .read_range(stream, StreamPosition::Beginning, StreamPosition::End, 1)
                .await?;
            let Some(msg) = batch.into_iter().next() else {
                break;
            };
            let response = ServiceResponse::from_message(&msg)?;
            self.transport.delete(stream, &msg.id).await?;
            if request_id.matches(&response.request_id) {
                tracing::debug!(
                    service = %service.name,
                    id = %msg.id,
                    "matched response in backlog"
                );
                return Ok(response.data);
            }
            tracing::debug!(
                service = %service.name,
                id = %msg.id,
                request_id = %response.request_id,
                "purged stale response"
            );
        }

        let group = self.response_group(service, request_id);
        self.transport.ensure_group(stream, &group).await?;
        loop {
            let batch = self
                .transport
                .read_group(stream, &group, &service.consumer, 1)
                .await?;
            for msg in batch {
                let response = ServiceResponse::from_message(&msg)?;
                if request_id.matches(&response.request_id) {
                    self.transport.delete(stream, &msg.id).await?;
                    tracing::debug!(service = %service.name, id = %msg.id, "matched response");
                    return Ok(response.data);
                }
                // Not ours; its owner reads it through its own group.
                tracing::debug!(
                    service = %service.name,
                    id = %msg.id,
                    request_id = %response.request_id,
                    "skipped response for another request"
                );
            }
        }
    }
}
