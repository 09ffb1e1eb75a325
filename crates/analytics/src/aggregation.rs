//! Core aggregation trait and position tracking.

use async_trait::async_trait;
use broker::{Record, topic};
use chrono::{DateTime, Utc};
use domain::{Order, OrderEvent};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::output::AnalyticsRecord;

/// Tracks how many input records an aggregation has consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationPosition {
    pub records_processed: u64,
    /// Records dropped because their window had already closed.
    pub late_records: u64,
}

impl AggregationPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> Self {
        Self {
            records_processed: self.records_processed + 1,
            ..*self
        }
    }

    pub fn late(&self) -> Self {
        Self {
            records_processed: self.records_processed + 1,
            late_records: self.late_records + 1,
        }
    }
}

impl std::fmt::Display for AggregationPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position({}, late {})",
            self.records_processed, self.late_records
        )
    }
}

/// A decoded input record.
#[derive(Debug, Clone)]
pub enum StreamInput {
    /// An order as published on `order.created`.
    OrderCreated(Order),
    /// A status transition from `order.events`.
    Lifecycle(OrderEvent),
}

impl StreamInput {
    /// Decodes a record according to its topic. Records of other topics
    /// yield `None`.
    pub fn decode(record: &Record) -> std::result::Result<Option<Self>, serde_json::Error> {
        match record.topic.as_str() {
            topic::ORDER_CREATED => Ok(Some(StreamInput::OrderCreated(record.decode()?))),
            topic::ORDER_EVENTS => Ok(Some(StreamInput::Lifecycle(record.decode()?))),
            _ => Ok(None),
        }
    }
}

/// A stateful computation over the order streams.
///
/// Aggregations receive each topic's records in event-time order across
/// partitions, offset order within a partition, and return whatever output
/// the record produced. Windowed aggregations also produce output when
/// [`Aggregation::punctuate`] moves time forward.
#[async_trait]
pub trait Aggregation: Send + Sync {
    fn name(&self) -> &'static str;

    /// Topic the aggregation reads.
    fn source_topic(&self) -> &'static str;

    async fn handle(
        &self,
        input: &StreamInput,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsRecord>>;

    /// Closes every window that ends at or before `now`.
    async fn punctuate(&self, _now: DateTime<Utc>) -> Vec<AnalyticsRecord> {
        Vec::new()
    }

    async fn position(&self) -> AggregationPosition;

    /// Drops all state.
    async fn reset(&self) -> Result<()>;

    async fn snapshot(&self) -> Result<serde_json::Value>;

    async fn restore(&self, state: serde_json::Value) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::Offset;

    #[test]
    fn position_tracks_late_records() {
        let pos = AggregationPosition::zero().advance().late();
        assert_eq!(pos.records_processed, 2);
        assert_eq!(pos.late_records, 1);
        assert_eq!(pos.to_string(), "position(2, late 1)");
    }

    #[test]
    fn decode_picks_type_from_topic() {
        let record = Record {
            topic: topic::ORDER_DEAD_LETTER.into(),
            partition: 0,
            offset: Offset::initial(),
            key: None,
            headers: Default::default(),
            timestamp: Utc::now(),
            payload: serde_json::json!({}),
        };
        assert!(StreamInput::decode(&record).unwrap().is_none());

        let record = Record {
            topic: topic::ORDER_CREATED.into(),
            ..record
        };
        assert!(StreamInput::decode(&record).is_err());
    }
}
