use chrono::{DateTime, Utc};
use toplist_middleware::StreamMessage;

use crate::error::Error;
use crate::Result;

pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_GET_LATEST: &str = "get_latest_data";
pub const FIELD_DATA: &str = "data";

/// Tolerance for matching a wire request id parsed back to `f64`.
const ID_MATCH_TOLERANCE: f64 = 1e-9;

/// Timestamp-derived correlation key.
///
/// An anchored id (client supplied a timestamp) is floored to the start of
/// its minute up front and doubles as the cache key. A latest id keeps
/// sub-second precision on the wire so concurrent requests cannot pick up
/// each other's responses; it is floored to the minute only when the merged
/// result is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestId {
    secs: f64,
    latest: bool,
}

impl RequestId {
    pub fn anchored(timestamp: i64) -> Self {
        Self {
            secs: floor_to_minute(timestamp) as f64,
            latest: false,
        }
    }

    pub fn latest(now: DateTime<Utc>) -> Self {
        Self {
            secs: now.timestamp_micros() as f64 / 1e6,
            latest: true,
        }
    }

    pub fn is_latest(&self) -> bool {
        self.latest
    }

    /// Correlation value as published on the wire.
    pub fn wire(&self) -> String {
        format!("{}", self.secs)
    }

    /// Minute-floored cache key. Distinct from `wire()` for latest ids.
    pub fn cache_key(&self) -> String {
        floor_to_minute(self.secs as i64).to_string()
    }

    /// Compare a wire `request_id` field against this id.
    pub fn matches(&self, wire_value: &str) -> bool {
        wire_value
            .trim()
            .parse::<f64>()
            .map(|value| (value - self.secs).abs() < ID_MATCH_TOLERANCE)
            .unwrap_or(false)
    }
}

fn floor_to_minute(timestamp: i64) -> i64 {
    timestamp.div_euclid(60) * 60
}

/// Request published to each upstream service's request stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub request_id: String,
    pub get_latest_data: bool,
}

impl ServiceRequest {
    pub fn new(id: &RequestId) -> Self {
        Self {
            request_id: id.wire(),
            get_latest_data: id.is_latest(),
        }
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let flag = if self.get_latest_data { "True" } else { "False" };
        vec![
            (FIELD_REQUEST_ID, self.request_id.clone()),
            (FIELD_GET_LATEST, flag.to_string()),
        ]
    }

    pub fn from_message(msg: &StreamMessage) -> Result<Self> {
        let request_id = require_field(msg, FIELD_REQUEST_ID)?;
        let get_latest_data = match msg.field(FIELD_GET_LATEST) {
            Some("True") => true,
            Some("False") | None => false,
            Some(other) => {
                return Err(Error::MalformedMessage(format!(
                    "unexpected {FIELD_GET_LATEST} value '{other}' in {}",
                    msg.id
                )))
            }
        };
        Ok(Self {
            request_id,
            get_latest_data,
        })
    }
}

/// Response consumed from an upstream service's response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub request_id: String,
    /// JSON array of per-entity records, opaque at this layer.
    pub data: String,
}

impl ServiceResponse {
    pub fn new(request_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            data: data.into(),
        }
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FIELD_REQUEST_ID, self.request_id.clone()),
            (FIELD_DATA, self.data.clone()),
        ]
    }

    pub fn from_message(msg: &StreamMessage) -> Result<Self> {
        Ok(Self {
            request_id: require_field(msg, FIELD_REQUEST_ID)?,
            data: require_field(msg, FIELD_DATA)?,
        })
    }
}

fn require_field(msg: &StreamMessage, name: &str) -> Result<String> {
    msg.field(name)
        .map(str::to_string)
        .ok_or_else(|| Error::MalformedMessage(format!("missing field '{name}' in {}", msg.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn message(pairs: &[(&str, &str)]) -> StreamMessage {
        StreamMessage {
            id: "0-0".to_string(),
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_anchored_id_floors_to_minute() {
        let id = RequestId::anchored(1706000123);
        assert!(!id.is_latest());
        assert_eq!(id.wire(), "1706000100");
        assert_eq!(id.cache_key(), "1706000100");
    }

    #[test]
    fn test_latest_id_keeps_subsecond_precision() {
        let now = DateTime::from_timestamp(1706000123, 250_000_000).unwrap();
        let id = RequestId::latest(now);
        assert!(id.is_latest());
        assert_eq!(id.wire(), "1706000123.25");
        // Cache key floors to the minute only at store time.
        assert_eq!(id.cache_key(), "1706000100");
    }

    #[test]
    fn test_wire_id_round_trip_matches() {
        let now = DateTime::from_timestamp(1706000123, 456_789_000).unwrap();
        let id = RequestId::latest(now);
        assert!(id.matches(&id.wire()));
        assert!(!id.matches("1706000123"));
        assert!(!id.matches("not-a-number"));
    }

    #[test]
    fn test_request_codec_round_trip() {
        let id = RequestId::anchored(1706000160);
        let request = ServiceRequest::new(&id);
        let fields = request.to_fields();
        assert!(fields.contains(&(FIELD_GET_LATEST, "False".to_string())));

        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let decoded = ServiceRequest::from_message(&message(&pairs)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_latest_flag_encoding() {
        let now = DateTime::from_timestamp(1706000123, 0).unwrap();
        let request = ServiceRequest::new(&RequestId::latest(now));
        let fields = request.to_fields();
        assert!(fields.contains(&(FIELD_GET_LATEST, "True".to_string())));
    }

    #[test]
    fn test_request_rejects_unknown_flag() {
        let msg = message(&[(FIELD_REQUEST_ID, "1"), (FIELD_GET_LATEST, "yes")]);
        assert!(matches!(
            ServiceRequest::from_message(&msg),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_requires_data_field() {
        let msg = message(&[(FIELD_REQUEST_ID, "1706000100")]);
        assert!(matches!(
            ServiceResponse::from_message(&msg),
            Err(Error::MalformedMessage(_))
        ));

        let msg = message(&[(FIELD_REQUEST_ID, "1706000100"), (FIELD_DATA, "[]")]);
        let response = ServiceResponse::from_message(&msg).unwrap();
        assert_eq!(response.data, "[]");
    }
}
