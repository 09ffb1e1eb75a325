use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::{Checkpoint, Offset, ProducerRecord, Record, RecordMetadata, Result};

/// A stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

/// Core trait for partitioned log implementations.
///
/// A broker keeps an append-only log per topic partition and the committed
/// position of each consumer group on each partition. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Appends a record to the partition chosen from its key.
    ///
    /// Records with the same key always land on the same partition, in
    /// publish order.
    async fn publish(&self, record: ProducerRecord) -> Result<RecordMetadata>;

    /// Number of partitions of a topic.
    async fn partition_count(&self, topic: &str) -> Result<u32>;

    /// Reads up to `max_records` records of a partition, starting at `from`.
    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max_records: usize,
    ) -> Result<Vec<Record>>;

    /// Offset the next appended record of the partition will receive.
    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset>;

    /// Next offset a consumer group will read from a partition.
    ///
    /// Groups that never committed start at [`Offset::initial`].
    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Offset>;

    /// Records `next` as the next offset the group will read.
    async fn commit(&self, group: &str, topic: &str, partition: u32, next: Offset) -> Result<()>;

    /// Stores a named checkpoint, replacing any previous one.
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Loads a named checkpoint.
    async fn load_checkpoint(&self, name: &str) -> Result<Option<Checkpoint>>;

    /// Waits until new records may be available or `timeout` elapses.
    ///
    /// The default implementation simply sleeps.
    async fn wait_for_records(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}

/// Extension trait with convenience methods for brokers.
#[async_trait]
pub trait BrokerExt: MessageBroker {
    /// Fetches the records after the group's committed offset.
    async fn poll(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        max_records: usize,
    ) -> Result<Vec<Record>> {
        let from = self.committed_offset(group, topic, partition).await?;
        self.fetch(topic, partition, from, max_records).await
    }

    /// Total number of records the group has not yet committed on a topic.
    async fn lag(&self, group: &str, topic: &str) -> Result<u64> {
        let mut lag = 0;
        for partition in 0..self.partition_count(topic).await? {
            let end = self.end_offset(topic, partition).await?;
            let committed = self.committed_offset(group, topic, partition).await?;
            lag += (end.as_i64() - committed.as_i64()).max(0) as u64;
        }
        Ok(lag)
    }

    /// Serializes `value` and publishes it under `key`.
    async fn publish_json<T: Serialize + Sync>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<RecordMetadata> {
        let record = ProducerRecord::builder()
            .topic(topic)
            .key(key)
            .payload(value)?
            .build();
        self.publish(record).await
    }

    /// Every record currently on a topic, partition by partition.
    async fn read_topic(&self, topic: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for partition in 0..self.partition_count(topic).await? {
            let mut from = Offset::initial();
            loop {
                let batch = self.fetch(topic, partition, from, 500).await?;
                let Some(last) = batch.last() else {
                    break;
                };
                from = last.offset.next();
                records.extend(batch);
            }
        }
        Ok(records)
    }

    /// Streams every record currently on a topic, ordered by timestamp.
    async fn stream_topic(&self, topic: &str) -> Result<RecordStream> {
        let mut records = self.read_topic(topic).await?;
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.partition.cmp(&b.partition))
                .then(a.offset.cmp(&b.offset))
        });
        Ok(Box::pin(futures_util::stream::iter(
            records.into_iter().map(Ok),
        )))
    }
}

impl<T: MessageBroker + ?Sized> BrokerExt for T {}

/// Chooses the partition for a keyed record.
///
/// Same hash as Kafka's default partitioner, so keys map to the same
/// partitions a Kafka cluster with identical partition counts would use.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    if partitions == 0 {
        return 0;
    }
    let positive = (murmur2(key.as_bytes()) & 0x7fff_ffff) as u32;
    positive % partitions
}

fn murmur2(data: &[u8]) -> i32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = SEED ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h as i32
}
