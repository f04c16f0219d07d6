use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::TransportError;

/// One decoded stream entry: broker-assigned id plus parsed field map.
///
/// Wire-format parsing stops at this boundary; consumers see string fields,
/// never raw broker reply values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamMessage {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Bound for range reads over a stream.
#[derive(Debug, Clone)]
pub enum StreamPosition {
    Beginning,
    End,
    Id(String),
}

/// Append-only stream abstraction with consumer-group semantics.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Append fields as a new message, returning the broker-assigned id.
    async fn append(
        &self,
        stream: &str,
        fields: &[(&str, String)],
    ) -> Result<String, TransportError>;

    /// Read up to `count` messages between the bounds, oldest first.
    async fn read_range(
        &self,
        stream: &str,
        start: StreamPosition,
        end: StreamPosition,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError>;

    /// Read the newest message in the stream, if any.
    async fn last(&self, stream: &str) -> Result<Option<StreamMessage>, TransportError>;

    /// Delete a message from the stream.
    async fn delete(&self, stream: &str, id: &str) -> Result<(), TransportError>;

    /// Create a consumer group on the stream. Succeeds if the group already
    /// exists.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TransportError>;

    /// Drop a consumer group from the stream. Succeeds if the group is
    /// already gone.
    async fn remove_group(&self, stream: &str, group: &str) -> Result<(), TransportError>;

    /// Read up to `count` undelivered messages for this consumer, suspending
    /// the calling task until at least one is available.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError>;

    /// Extend the processing lease on a pending message.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        id: &str,
    ) -> Result<(), TransportError>;

    /// Number of messages currently in the stream.
    async fn len(&self, stream: &str) -> Result<usize, TransportError>;
}
