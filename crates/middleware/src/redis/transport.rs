use async_trait::async_trait;
use redis::streams::{
    StreamClaimReply, StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{StreamMessage, StreamPosition, Transport};

/// Chunk length for blocking group reads. The caller owns the overall
/// deadline; short chunks keep the wait cancellable.
const READ_BLOCK_MS: usize = 1000;

/// Redis Streams transport.
///
/// Plain commands share one multiplexed connection. Blocking group reads open
/// a dedicated connection per wait, so a BLOCK can never stall unrelated
/// commands issued by concurrent requests.
pub struct RedisTransport {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisTransport {
    pub async fn connect(redis_url: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Test connection
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::info!("Connected to Redis streams");
        Ok(Self { client, conn })
    }

    fn bound(position: &StreamPosition, when_beginning: &str, when_end: &str) -> String {
        match position {
            StreamPosition::Beginning => when_beginning.to_string(),
            StreamPosition::End => when_end.to_string(),
            StreamPosition::Id(id) => id.clone(),
        }
    }
}

fn decode_entry(entry: StreamId) -> Result<StreamMessage, TransportError> {
    let id = entry.id;
    let mut fields = HashMap::with_capacity(entry.map.len());
    for (name, value) in entry.map {
        let text: String = redis::from_redis_value(value)
            .map_err(|e| TransportError::Decode(format!("field '{name}' of {id}: {e}")))?;
        fields.insert(name, text);
    }
    Ok(StreamMessage { id, fields })
}

#[async_trait]
impl Transport for RedisTransport {
    async fn append(
        &self,
        stream: &str,
        fields: &[(&str, String)],
    ) -> Result<String, TransportError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(stream, "*", fields)
            .await
            .map_err(|e| TransportError::AppendFailed(e.to_string()))?;
        tracing::debug!(stream, id = %id, "XADD");
        Ok(id)
    }

    async fn read_range(
        &self,
        stream: &str,
        start: StreamPosition,
        end: StreamPosition,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError> {
        let start = Self::bound(&start, "-", "+");
        let end = Self::bound(&end, "-", "+");

        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrange_count(stream, &start, &end, count)
            .await
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        reply.ids.into_iter().map(decode_entry).collect()
    }

    async fn last(&self, stream: &str) -> Result<Option<StreamMessage>, TransportError> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrevrange_count(stream, "+", "-", 1)
            .await
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        reply.ids.into_iter().next().map(decode_entry).transpose()
    }

    async fn delete(&self, stream: &str, id: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .xdel(stream, &[id])
            .await
            .map_err(|e| TransportError::DeleteFailed(e.to_string()))?;
        tracing::debug!(stream, id, removed, "XDEL");
        Ok(())
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        let created: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "$").await;
        match created {
            Ok(_) => {
                tracing::info!(stream, group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(TransportError::GroupFailed(e.to_string())),
        }
    }

    async fn remove_group(&self, stream: &str, group: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        let destroyed: Result<u64, redis::RedisError> = conn.xgroup_destroy(stream, group).await;
        match destroyed {
            Ok(_) => {
                tracing::debug!(stream, group, "XGROUP DESTROY");
                Ok(())
            }
            Err(e) if e.code() == Some("NOGROUP") => Ok(()),
            Err(e) => Err(TransportError::GroupFailed(e.to_string())),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>, TransportError> {
        // Dedicated connection: XREADGROUP BLOCK parks the whole connection.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(READ_BLOCK_MS);

        loop {
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[stream], &[">"], &options)
                .await
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
            let Some(reply) = reply else {
                continue;
            };
            let messages: Vec<StreamMessage> = reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .map(decode_entry)
                .collect::<Result<_, _>>()?;
            if !messages.is_empty() {
                return Ok(messages);
            }
        }
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        id: &str,
    ) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        let _: StreamClaimReply = conn
            .xclaim(stream, group, consumer, min_idle.as_millis() as u64, &[id])
            .await
            .map_err(|e| TransportError::GroupFailed(e.to_string()))?;
        tracing::debug!(stream, group, id, "XCLAIM");
        Ok(())
    }

    async fn len(&self, stream: &str) -> Result<usize, TransportError> {
        let mut conn = self.conn.clone();
        conn.xlen(stream)
            .await
            .map_err(|e| TransportError::ReadFailed(e.to_string()))
    }
}
