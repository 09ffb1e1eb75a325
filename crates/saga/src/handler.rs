//! The seam between the consumer runtime and stage logic.

use async_trait::async_trait;
use broker::Record;
use serde::de::DeserializeOwned;

use crate::error::{Result, StageError};

/// Handles the records of one subscription.
///
/// Handlers must tolerate redelivery: a record may be handed over again
/// after a crash or a failed commit.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Stage name used in logs, metrics and dead letters.
    fn name(&self) -> &'static str;

    async fn handle(&self, record: &Record) -> Result<()>;

    /// Handles a whole poll batch. Returns one result per record.
    ///
    /// The default handles records one at a time.
    async fn handle_batch(&self, records: &[Record]) -> Vec<Result<()>> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.handle(record).await);
        }
        results
    }
}

/// Decodes a record payload, reporting where a malformed payload came from.
pub fn decode<T: DeserializeOwned>(record: &Record) -> Result<T> {
    record
        .decode()
        .map_err(|source| StageError::Deserialization {
            coordinates: record.coordinates(),
            source,
        })
}
