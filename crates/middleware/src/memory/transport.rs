use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::error::TransportError;
use crate::transport::{StreamMessage, StreamPosition, Transport};

#[derive(Default)]
struct StreamState {
    /// Live entries, oldest first. Deleted entries are removed outright;
    /// group cursors are untouched by deletion.
    entries: Vec<(u64, StreamMessage)>,
    next_seq: u64,
    /// Per-group cursor: sequence of the next entry to deliver.
    groups: HashMap<String, u64>,
}

/// In-memory stream transport with consumer-group cursors.
///
/// Groups start at the stream tail, so `read_group` only sees messages
/// appended after group creation; older messages are reachable via
/// `read_range`.
pub struct InMemoryTransport {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
    appended: Arc<Notify>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            appended: Arc::new(Notify::new()),
        }
    }

    fn parse_seq(id: &str) -> Result<u64, TransportError> {
        id.split('-')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| TransportError::ReadFailed(format!("malformed message id: {id}")))
    }

    fn bound(position: &StreamPosition, when_beginning: u64, when_end: u64) -> Result<u64, TransportError> {
        match position {
            StreamPosition::Beginning => Ok(when_beginning),
            StreamPosition::End => Ok(when_end),
            StreamPosition::Id(id) => Self::parse_seq(id),
        }
    }

    async fn try_read_group(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Option<Vec<StreamMessage>>, TransportError> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| TransportError::GroupFailed(format!("no such stream: {stream}")))?;
        let cursor = state
            .groups
            .get(group)
            .copied()
            .ok_or_else(|| TransportError::GroupFailed(format!("no group '{group}' on stream '{stream}'")))?;

        let delivered: Vec<(u64, StreamMessage)> = state
            .entries
            .iter()
            .filter(|(seq, _)| *seq >= cursor)
            .take(count)
            .cloned()
            .collect();

        if delivered.is_empty() {
            return Ok(None);
        }

        let last_seq = delivered.last().map(|(seq, _)| *seq).unwrap_or(cursor);
        state.groups.insert(group.to_string(), last_seq + 1);
        Ok(Some(delivered.into_iter().map(|(_, msg)| msg).collect()))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn append(
        &self,
        stream: &str,
        fields: &[(&str, String)],
    ) -> Result<String, TransportError> {
        let id = {
            let mut streams = self.streams.lock().await;
            let state = streams.entry(stream.to_string()).or_default();
            let seq = state.next_seq;
            state.next_seq += 1;
            let id = format!("{seq}-0");
            let fields = fields
                .iter()
                .map(|(name, value)| ((*name).to_string(), value.clone()))
                .collect();
            state.entries.push((
                seq,
                StreamMessage {
                    id: id.clone(),
                    fields,
                },
            ));
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_range(
        &self,
        stream: &str,
        start: StreamPosition,
        end: StreamPosition,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError> {
        let lo = Self::bound(&start, 0, u64::MAX)?;
        let hi = Self::bound(&end, 0, u64::MAX)?;

        let streams = self.streams.lock().await;
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        Ok(state
            .entries
            .iter()
            .filter(|(seq, _)| *seq >= lo && *seq <= hi)
            .take(count)
            .map(|(_, msg)| msg.clone())
            .collect())
    }

    async fn last(&self, stream: &str) -> Result<Option<StreamMessage>, TransportError> {
        let streams = self.streams.lock().await;
        Ok(streams
            .get(stream)
            .and_then(|state| state.entries.last().map(|(_, msg)| msg.clone())))
    }

    async fn delete(&self, stream: &str, id: &str) -> Result<(), TransportError> {
        let mut streams = self.streams.lock().await;
        if let Some(state) = streams.get_mut(stream) {
            state.entries.retain(|(_, msg)| msg.id != id);
        }
        Ok(())
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TransportError> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        let tail = state.next_seq;
        state.groups.entry(group.to_string()).or_insert(tail);
        Ok(())
    }

    async fn remove_group(&self, stream: &str, group: &str) -> Result<(), TransportError> {
        let mut streams = self.streams.lock().await;
        if let Some(state) = streams.get_mut(stream) {
            state.groups.remove(group);
        }
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError> {
        loop {
            if let Some(batch) = self.try_read_group(stream, group, count).await? {
                return Ok(batch);
            }
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // Re-check: an append may have landed between the miss and the
            // waiter registration.
            if let Some(batch) = self.try_read_group(stream, group, count).await? {
                return Ok(batch);
            }
            notified.await;
        }
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        _min_idle: Duration,
        _id: &str,
    ) -> Result<(), TransportError> {
        // Lease bookkeeping is not modeled in memory; just validate the group.
        let streams = self.streams.lock().await;
        let known = streams
            .get(stream)
            .map(|state| state.groups.contains_key(group))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(TransportError::GroupFailed(format!(
                "no group '{group}' on stream '{stream}'"
            )))
        }
    }

    async fn len(&self, stream: &str) -> Result<usize, TransportError> {
        let streams = self.streams.lock().await;
        Ok(streams.get(stream).map(|state| state.entries.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_range() {
        let transport = InMemoryTransport::new();
        transport
            .append("s", &[("n", "1".to_string())])
            .await
            .unwrap();
        transport
            .append("s", &[("n", "2".to_string())])
            .await
            .unwrap();

        let msgs = transport
            .read_range("s", StreamPosition::Beginning, StreamPosition::End, 10)
            .await
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].field("n"), Some("1"));
        assert_eq!(msgs[1].field("n"), Some("2"));

        let one = transport
            .read_range("s", StreamPosition::Beginning, StreamPosition::End, 1)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].field("n"), Some("1"));
    }

    #[tokio::test]
    async fn test_delete_and_len() {
        let transport = InMemoryTransport::new();
        let id = transport
            .append("s", &[("n", "1".to_string())])
            .await
            .unwrap();
        assert_eq!(transport.len("s").await.unwrap(), 1);

        transport.delete("s", &id).await.unwrap();
        assert_eq!(transport.len("s").await.unwrap(), 0);
        assert_eq!(transport.len("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last() {
        let transport = InMemoryTransport::new();
        assert!(transport.last("s").await.unwrap().is_none());
        transport
            .append("s", &[("n", "1".to_string())])
            .await
            .unwrap();
        transport
            .append("s", &[("n", "2".to_string())])
            .await
            .unwrap();
        let newest = transport.last("s").await.unwrap().unwrap();
        assert_eq!(newest.field("n"), Some("2"));
    }

    #[tokio::test]
    async fn test_ensure_group_is_idempotent() {
        let transport = InMemoryTransport::new();
        transport.ensure_group("s", "g").await.unwrap();
        transport.ensure_group("s", "g").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_group() {
        let transport = InMemoryTransport::new();
        transport.ensure_group("s", "g").await.unwrap();
        transport.remove_group("s", "g").await.unwrap();
        // Removing again is fine; reading through the dropped group is not.
        transport.remove_group("s", "g").await.unwrap();
        let err = transport.read_group("s", "g", "c", 1).await;
        assert!(matches!(err, Err(TransportError::GroupFailed(_))));
    }

    #[tokio::test]
    async fn test_group_sees_only_new_messages() {
        let transport = InMemoryTransport::new();
        transport
            .append("s", &[("n", "old".to_string())])
            .await
            .unwrap();
        transport.ensure_group("s", "g").await.unwrap();
        transport
            .append("s", &[("n", "new".to_string())])
            .await
            .unwrap();

        let msgs = transport.read_group("s", "g", "c", 10).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].field("n"), Some("new"));
    }

    #[tokio::test]
    async fn test_read_group_wakes_on_append() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.ensure_group("s", "g").await.unwrap();

        let writer = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .append("s", &[("n", "late".to_string())])
                .await
                .unwrap();
        });

        let msgs = tokio::time::timeout(
            Duration::from_secs(5),
            transport.read_group("s", "g", "c", 1),
        )
        .await
        .expect("read_group should wake on append")
        .unwrap();
        assert_eq!(msgs[0].field("n"), Some("late"));
    }

    #[tokio::test]
    async fn test_read_group_without_group_fails() {
        let transport = InMemoryTransport::new();
        transport
            .append("s", &[("n", "1".to_string())])
            .await
            .unwrap();
        let err = transport.read_group("s", "missing", "c", 1).await;
        assert!(matches!(err, Err(TransportError::GroupFailed(_))));
    }

    #[tokio::test]
    async fn test_claim_requires_group() {
        let transport = InMemoryTransport::new();
        let id = transport
            .append("s", &[("n", "1".to_string())])
            .await
            .unwrap();
        let err = transport
            .claim("s", "g", "c", Duration::from_secs(10), &id)
            .await;
        assert!(matches!(err, Err(TransportError::GroupFailed(_))));

        transport.ensure_group("s", "g").await.unwrap();
        transport
            .claim("s", "g", "c", Duration::from_secs(10), &id)
            .await
            .unwrap();
    }
}
