//! Dead-letter records.
//!
//! A record that a consumer cannot process is wrapped in a [`DeadLetter`]
//! and published to `order.dead-letter` so it is kept for inspection and
//! manual replay instead of blocking its partition or being dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Headers, Offset, ProducerRecord, Record, topic};

pub const HEADER_SOURCE_TOPIC: &str = "dlq-source-topic";
pub const HEADER_FAILURE_KIND: &str = "dlq-failure-kind";

/// Why a record was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The payload could not be decoded into the topic's type.
    Deserialization,
    /// The handler failed and retries were exhausted or pointless.
    Processing,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Deserialization => "DESERIALIZATION",
            FailureKind::Processing => "PROCESSING",
        }
    }
}

/// A poison record with the context needed to diagnose and replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub source_topic: String,
    pub source_partition: u32,
    pub source_offset: Offset,
    pub key: Option<String>,
    pub headers: Headers,
    pub payload: serde_json::Value,

    /// Consumer group that gave up on the record.
    pub consumer_group: String,
    /// Handler that failed.
    pub stage: String,

    pub kind: FailureKind,
    pub reason: String,
    /// Handler invocations made before giving up.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_record(
        record: &Record,
        consumer_group: impl Into<String>,
        stage: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
        attempts: u32,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_topic: record.topic.clone(),
            source_partition: record.partition,
            source_offset: record.offset,
            key: record.key.clone(),
            headers: record.headers.clone(),
            payload: record.payload.clone(),
            consumer_group: consumer_group.into(),
            stage: stage.into(),
            kind,
            reason: reason.into(),
            attempts,
            failed_at,
        }
    }

    /// The record to publish on the dead-letter topic.
    pub fn to_producer_record(&self) -> Result<ProducerRecord, serde_json::Error> {
        let mut builder = ProducerRecord::builder()
            .topic(topic::ORDER_DEAD_LETTER)
            .header(HEADER_SOURCE_TOPIC, &self.source_topic)
            .header(HEADER_FAILURE_KIND, self.kind.as_str())
            .timestamp(self.failed_at)
            .payload(self)?;
        if let Some(key) = &self.key {
            builder = builder.key(key);
        }
        Ok(builder.build())
    }

    /// The original record, ready to be republished to its source topic.
    pub fn replay_record(&self) -> ProducerRecord {
        let mut builder = ProducerRecord::builder()
            .topic(&self.source_topic)
            .headers(self.headers.clone())
            .payload_raw(self.payload.clone());
        if let Some(key) = &self.key {
            builder = builder.key(key);
        }
        builder.build()
    }
}
