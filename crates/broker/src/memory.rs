use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use crate::{
    BrokerError, Checkpoint, Offset, ProducerRecord, Record, RecordMetadata, Result,
    broker::{MessageBroker, partition_for_key},
    topic::{TOPICS, TopicSpec},
};

#[derive(Default)]
struct BrokerState {
    partitions: HashMap<String, Vec<Vec<Record>>>,
    offsets: HashMap<(String, String, u32), Offset>,
    checkpoints: HashMap<String, Checkpoint>,
    round_robin: u32,
}

/// In-process partitioned log.
///
/// Keeps every partition as a vector of records and provides the same
/// interface as the PostgreSQL implementation. Consumers blocked in
/// [`MessageBroker::wait_for_records`] are woken on every publish.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
    notify: Arc<Notify>,
    failing_topics: Arc<std::sync::RwLock<HashSet<String>>>,
}

impl InMemoryBroker {
    /// Creates a broker with every topic of the fulfillment system.
    pub fn new() -> Self {
        Self::with_topics(TOPICS)
    }

    /// Creates a broker with only the given topics.
    pub fn with_topics(topics: &[TopicSpec]) -> Self {
        let partitions = topics
            .iter()
            .map(|t| {
                (
                    t.name.to_string(),
                    vec![Vec::new(); t.partitions.max(1) as usize],
                )
            })
            .collect();
        Self {
            state: Arc::new(RwLock::new(BrokerState {
                partitions,
                ..BrokerState::default()
            })),
            notify: Arc::new(Notify::new()),
            failing_topics: Arc::new(std::sync::RwLock::new(HashSet::new())),
        }
    }

    /// Makes every publish to `topic` fail until called again with `false`.
    pub fn set_fail_on_publish(&self, topic: &str, fail: bool) {
        let mut failing = self.failing_topics.write().unwrap();
        if fail {
            failing.insert(topic.to_string());
        } else {
            failing.remove(topic);
        }
    }

    /// Number of records on a topic across all partitions.
    pub async fn record_count(&self, topic: &str) -> usize {
        let state = self.state.read().await;
        state
            .partitions
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Every record on a topic, ordered by timestamp then partition and offset.
    pub async fn records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.read().await;
        let mut records: Vec<Record> = state
            .partitions
            .get(topic)
            .map(|parts| parts.iter().flatten().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.partition.cmp(&b.partition))
                .then(a.offset.cmp(&b.offset))
        });
        records
    }

    /// Removes every record, committed offset and checkpoint.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        for parts in state.partitions.values_mut() {
            parts.iter_mut().for_each(Vec::clear);
        }
        state.offsets.clear();
        state.checkpoints.clear();
    }

    fn is_failing(&self, topic: &str) -> bool {
        self.failing_topics
            .read()
            .map(|failing| failing.contains(topic))
            .unwrap_or(false)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn partition_range(topic: &str, partition: u32, partitions: usize) -> Result<usize> {
    let index = partition as usize;
    if index >= partitions {
        return Err(BrokerError::UnknownPartition {
            topic: topic.to_string(),
            partition,
            partitions: partitions as u32,
        });
    }
    Ok(index)
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        if self.is_failing(&record.topic) {
            tracing::warn!(topic = %record.topic, "publish rejected by fault injection");
            return Err(BrokerError::PublishRejected {
                topic: record.topic,
                reason: "injected failure".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let partition_count = state
            .partitions
            .get(&record.topic)
            .map(Vec::len)
            .ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?
            as u32;

        let partition = match &record.key {
            Some(key) => partition_for_key(key, partition_count),
            None => {
                state.round_robin = state.round_robin.wrapping_add(1);
                state.round_robin % partition_count
            }
        };

        let log = state
            .partitions
            .get_mut(&record.topic)
            .and_then(|parts| parts.get_mut(partition as usize))
            .ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?;

        let offset = Offset::new(log.len() as i64);
        let timestamp = record.timestamp.unwrap_or_else(Utc::now);
        log.push(Record {
            topic: record.topic.clone(),
            partition,
            offset,
            key: record.key,
            headers: record.headers,
            timestamp,
            payload: record.payload,
        });
        drop(state);

        self.notify.notify_waiters();
        metrics::counter!("broker_records_published_total", "topic" => record.topic.clone())
            .increment(1);

        Ok(RecordMetadata {
            topic: record.topic,
            partition,
            offset,
            timestamp,
        })
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let state = self.state.read().await;
        state
            .partitions
            .get(topic)
            .map(|parts| parts.len() as u32)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max_records: usize,
    ) -> Result<Vec<Record>> {
        let state = self.state.read().await;
        let parts = state
            .partitions
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        let log = &parts[partition_range(topic, partition, parts.len())?];

        let start = from.as_i64().max(0) as usize;
        Ok(log.iter().skip(start).take(max_records).cloned().collect())
    }

    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset> {
        let state = self.state.read().await;
        let parts = state
            .partitions
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        let log = &parts[partition_range(topic, partition, parts.len())?];
        Ok(Offset::new(log.len() as i64))
    }

    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Offset> {
        let state = self.state.read().await;
        Ok(state
            .offsets
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or_default())
    }

    async fn commit(&self, group: &str, topic: &str, partition: u32, next: Offset) -> Result<()> {
        let mut state = self.state.write().await;
        let parts = state
            .partitions
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        partition_range(topic, partition, parts.len())?;

        state
            .offsets
            .insert((group.to_string(), topic.to_string(), partition), next);
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .checkpoints
            .insert(checkpoint.name.clone(), checkpoint);
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<Option<Checkpoint>> {
        let state = self.state.read().await;
        Ok(state.checkpoints.get(name).cloned())
    }

    async fn wait_for_records(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}
