use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Offset;

/// Read position of a consumer on one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPosition {
    pub topic: String,
    pub partition: u32,
    /// Next offset to read.
    pub offset: Offset,
}

/// Saved state of a stateful consumer together with the positions it was
/// computed from.
///
/// Restoring both at once lets a consumer resume without replaying the
/// partitions from the beginning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Name of the consumer that owns the checkpoint.
    pub name: String,

    pub positions: Vec<PartitionPosition>,

    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,

    /// The serialized consumer state.
    pub state: serde_json::Value,
}

impl Checkpoint {
    pub fn new(
        name: impl Into<String>,
        positions: Vec<PartitionPosition>,
        timestamp: DateTime<Utc>,
        state: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            positions,
            timestamp,
            state,
        }
    }

    /// Creates a checkpoint from a serializable state.
    pub fn from_state<T: Serialize>(
        name: impl Into<String>,
        positions: Vec<PartitionPosition>,
        timestamp: DateTime<Utc>,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            name,
            positions,
            timestamp,
            serde_json::to_value(state)?,
        ))
    }

    /// Deserializes the checkpoint state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    /// Saved position for a partition, if the checkpoint covers it.
    pub fn position(&self, topic: &str, partition: u32) -> Option<Offset> {
        self.positions
            .iter()
            .find(|p| p.topic == topic && p.partition == partition)
            .map(|p| p.offset)
    }
}
