use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{BrokerError, Result};

/// Position of a record within one partition.
///
/// Offsets start at 0 and increase by 1 for each record appended to the
/// partition. A committed offset is the offset of the next record to read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The offset of the first record of a partition.
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

/// Record headers. Ordered so that serialized records are stable.
pub type Headers = BTreeMap<String, String>;

/// A record as stored on a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,

    /// Partition key. Every order-related record is keyed by order id.
    pub key: Option<String>,

    pub headers: Headers,

    /// Append time, or the producer-supplied event time.
    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,
}

impl Record {
    /// Deserializes the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Human-readable coordinates, e.g. `order.created/3@17`.
    pub fn coordinates(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// A record handed to the broker for publication.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord {
    pub topic: String,
    pub key: Option<String>,
    pub headers: Headers,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}

impl ProducerRecord {
    pub fn builder() -> ProducerRecordBuilder {
        ProducerRecordBuilder::default()
    }
}

/// Builder for [`ProducerRecord`].
#[derive(Debug, Default)]
pub struct ProducerRecordBuilder {
    topic: Option<String>,
    key: Option<String>,
    headers: Headers,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl ProducerRecordBuilder {
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the partition key. Records without a key are spread round-robin.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the record timestamp. If not set, the broker stamps append time.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> std::result::Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the record.
    ///
    /// # Panics
    ///
    /// Panics if the topic or payload is not set.
    pub fn build(self) -> ProducerRecord {
        ProducerRecord {
            topic: self.topic.expect("topic is required"),
            key: self.key,
            headers: self.headers,
            timestamp: self.timestamp,
            payload: self.payload.expect("payload is required"),
        }
    }

    /// Builds the record, reporting a missing field as an error.
    pub fn try_build(self) -> Result<ProducerRecord> {
        Ok(ProducerRecord {
            topic: self
                .topic
                .ok_or_else(|| BrokerError::InvalidRecord("topic is required".into()))?,
            key: self.key,
            headers: self.headers,
            timestamp: self.timestamp,
            payload: self
                .payload
                .ok_or_else(|| BrokerError::InvalidRecord("payload is required".into()))?,
        })
    }
}

/// Where a published record landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
    pub timestamp: DateTime<Utc>,
}
