//! Feeds topic records to the aggregations and publishes their output.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use broker::{
    BrokerExt, Checkpoint, DeadLetter, FailureKind, MessageBroker, Offset, PartitionPosition,
    Record, topic,
};
use common::Clock;
use tokio::sync::{Mutex, watch};

use crate::aggregation::{Aggregation, StreamInput};
use crate::output::AnalyticsRecord;
use crate::{AnalyticsError, Result};

/// Name of the engine's checkpoint and of its dead letters' consumer group.
pub const ENGINE_NAME: &str = "order-analytics";

const FETCH_SIZE: usize = 500;

/// Runs the registered aggregations over `order.created` and `order.events`.
///
/// The engine does not join a consumer group; it tracks its own read
/// position per partition so that a checkpoint can store positions and
/// aggregation state together. Without a checkpoint it starts from the
/// first retained record.
pub struct AnalyticsEngine<B> {
    broker: B,
    clock: Arc<dyn Clock>,
    aggregations: Vec<Arc<dyn Aggregation>>,
    positions: Mutex<BTreeMap<(String, u32), Offset>>,
}

impl<B: MessageBroker> AnalyticsEngine<B> {
    pub fn new(broker: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            broker,
            clock,
            aggregations: Vec::new(),
            positions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn register(&mut self, aggregation: Arc<dyn Aggregation>) -> &mut Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn aggregation_count(&self) -> usize {
        self.aggregations.len()
    }

    fn source_topics(&self) -> BTreeSet<&'static str> {
        self.aggregations.iter().map(|a| a.source_topic()).collect()
    }

    /// Next offset the engine will read from a partition.
    pub async fn position(&self, topic: &str, partition: u32) -> Offset {
        self.positions
            .lock()
            .await
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or_else(Offset::initial)
    }

    /// Reads one batch from every source partition and processes it.
    ///
    /// Returns the number of records consumed.
    pub async fn poll_once(&self) -> Result<usize> {
        let mut consumed = 0;
        for source in self.source_topics() {
            consumed += self.poll_topic(source).await?;
        }
        Ok(consumed)
    }

    /// Processes one batch per partition of `source`, merged by event time.
    ///
    /// Windowed aggregations keep one watermark per topic, so records from
    /// different partitions must reach them in timestamp order. The merge
    /// stops once a full batch runs dry: its partition may hold earlier
    /// records than the other buffers, and the next poll fetches them.
    async fn poll_topic(&self, source: &'static str) -> Result<usize> {
        let mut batches = Vec::new();
        for partition in 0..self.broker.partition_count(source).await? {
            let from = self.position(source, partition).await;
            let records = self.broker.fetch(source, partition, from, FETCH_SIZE).await?;
            batches.push(PartitionBatch {
                truncated: records.len() == FETCH_SIZE,
                records: records.into(),
            });
        }

        let mut consumed = 0;
        loop {
            if batches.iter().any(|b| b.truncated && b.records.is_empty()) {
                break;
            }
            // Ties go to the lower partition.
            let Some(batch) = batches
                .iter_mut()
                .filter(|b| !b.records.is_empty())
                .min_by_key(|b| b.records.front().map(|r| r.timestamp))
            else {
                break;
            };
            let Some(record) = batch.records.pop_front() else {
                break;
            };
            self.process(&record).await?;
            self.positions
                .lock()
                .await
                .insert((source.to_string(), record.partition), record.offset.next());
            consumed += 1;
        }
        Ok(consumed)
    }

    /// Processes everything currently on the source topics.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let consumed = self.poll_once().await?;
            if consumed == 0 {
                break;
            }
            total += consumed;
        }
        tracing::info!(records = total, "analytics catch-up complete");
        Ok(total)
    }

    #[tracing::instrument(skip(self, record), fields(topic = %record.topic, partition = record.partition, offset = %record.offset))]
    async fn process(&self, record: &Record) -> Result<()> {
        let input = match StreamInput::decode(record) {
            Ok(Some(input)) => input,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "malformed analytics input");
                let dead = DeadLetter::from_record(
                    record,
                    ENGINE_NAME,
                    ENGINE_NAME,
                    FailureKind::Deserialization,
                    e.to_string(),
                    1,
                    self.clock.now(),
                );
                self.broker.publish(dead.to_producer_record()?).await?;
                metrics::counter!("dead_letters_total", "stage" => ENGINE_NAME).increment(1);
                return Ok(());
            }
        };

        for aggregation in &self.aggregations {
            if aggregation.source_topic() != record.topic {
                continue;
            }
            let output = aggregation.handle(&input, record.timestamp).await?;
            self.publish(aggregation.name(), output).await?;
        }
        Ok(())
    }

    async fn publish(&self, aggregation: &'static str, output: Vec<AnalyticsRecord>) -> Result<()> {
        for record in output {
            self.broker
                .publish_json(topic::ORDER_ANALYTICS, &record.key(), &record)
                .await?;
            tracing::debug!(aggregation, kind = record.type_name(), key = %record.key(), "analytics record published");
            metrics::counter!("analytics_records_total", "type" => record.type_name()).increment(1);
        }
        Ok(())
    }

    /// Closes windows that ended before the clock's current time.
    pub async fn punctuate(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut emitted = 0;
        for aggregation in &self.aggregations {
            let output = aggregation.punctuate(now).await;
            emitted += output.len();
            self.publish(aggregation.name(), output).await?;
        }
        Ok(emitted)
    }

    /// Drops every aggregation's state and replays the retained history.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<usize> {
        for aggregation in &self.aggregations {
            aggregation.reset().await?;
        }
        self.positions.lock().await.clear();
        self.run_catch_up().await
    }

    /// Saves positions and aggregation state under [`ENGINE_NAME`].
    pub async fn checkpoint(&self) -> Result<()> {
        let positions = self.positions.lock().await;
        let mut state = BTreeMap::new();
        for aggregation in &self.aggregations {
            state.insert(aggregation.name(), aggregation.snapshot().await?);
        }
        let checkpoint = Checkpoint::from_state(
            ENGINE_NAME,
            positions
                .iter()
                .map(|((topic, partition), offset)| PartitionPosition {
                    topic: topic.clone(),
                    partition: *partition,
                    offset: *offset,
                })
                .collect(),
            self.clock.now(),
            &state,
        )?;
        self.broker.save_checkpoint(checkpoint).await?;
        tracing::debug!(partitions = positions.len(), "analytics checkpoint saved");
        Ok(())
    }

    /// Loads the saved checkpoint. Returns false if there is none.
    pub async fn restore(&self) -> Result<bool> {
        let Some(checkpoint) = self.broker.load_checkpoint(ENGINE_NAME).await? else {
            return Ok(false);
        };
        let saved_positions = checkpoint.positions.clone();
        let mut state: BTreeMap<String, serde_json::Value> = checkpoint.into_state()?;

        for aggregation in &self.aggregations {
            let snapshot = state.remove(aggregation.name()).ok_or_else(|| {
                AnalyticsError::Checkpoint(format!("no state for {}", aggregation.name()))
            })?;
            aggregation.restore(snapshot).await?;
        }

        let mut positions = self.positions.lock().await;
        positions.clear();
        positions.extend(
            saved_positions
                .into_iter()
                .map(|p| ((p.topic, p.partition), p.offset)),
        );
        tracing::info!(partitions = positions.len(), "analytics state restored");
        Ok(true)
    }
}

struct PartitionBatch {
    records: VecDeque<Record>,
    truncated: bool,
}

/// Intervals of the engine's background work.
#[derive(Debug, Clone, Copy)]
pub struct EngineSchedule {
    pub punctuate_every: Duration,
    pub checkpoint_every: Duration,
    /// Longest wait for new records before polling again.
    pub idle_wait: Duration,
}

impl Default for EngineSchedule {
    fn default() -> Self {
        Self {
            punctuate_every: Duration::from_secs(10),
            checkpoint_every: Duration::from_secs(30),
            idle_wait: Duration::from_millis(500),
        }
    }
}

impl<B: MessageBroker + 'static> AnalyticsEngine<B> {
    /// Processes records until `shutdown` turns true, then saves a final
    /// checkpoint.
    pub async fn run(&self, schedule: EngineSchedule, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut punctuate = tokio::time::interval(schedule.punctuate_every);
        let mut checkpoint = tokio::time::interval(schedule.checkpoint_every);
        punctuate.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        checkpoint.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(aggregations = self.aggregations.len(), "analytics engine started");
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = punctuate.tick() => {
                    if let Err(e) = self.punctuate().await {
                        tracing::error!(error = %e, "punctuation failed");
                    }
                }
                _ = checkpoint.tick() => {
                    if let Err(e) = self.checkpoint().await {
                        tracing::error!(error = %e, "checkpoint failed");
                    }
                }
                _ = self.broker.wait_for_records(schedule.idle_wait) => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "analytics poll failed");
                    }
                }
            }
        }

        self.checkpoint().await?;
        tracing::info!("analytics engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{CustomerLoyaltyView, StatusCountsView};
    use broker::{InMemoryBroker, ProducerRecord};
    use chrono::{TimeZone, Utc};
    use common::ManualClock;
    use domain::{Money, Order, OrderItem};

    fn engine(broker: &InMemoryBroker, clock: &ManualClock) -> AnalyticsEngine<InMemoryBroker> {
        let mut engine = AnalyticsEngine::new(broker.clone(), Arc::new(clock.clone()));
        engine
            .register(Arc::new(CustomerLoyaltyView::new()))
            .register(Arc::new(StatusCountsView::new()));
        engine
    }

    async fn publish_order(broker: &InMemoryBroker, customer: &str) {
        let order = Order::builder()
            .customer(customer, "Alan Turing", "alan@example.com")
            .item(OrderItem::new("P-1", "Widget", 1, Money::from_dollars(20)))
            .build();
        broker
            .publish_json(topic::ORDER_CREATED, order.order_id.as_str(), &order)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn catch_up_consumes_each_record_once() {
        let broker = InMemoryBroker::new();
        let clock = ManualClock::default();
        let engine = engine(&broker, &clock);
        for _ in 0..3 {
            publish_order(&broker, "CUST-1").await;
        }

        assert_eq!(engine.run_catch_up().await.unwrap(), 3);
        assert_eq!(engine.run_catch_up().await.unwrap(), 0);
        assert_eq!(broker.record_count(topic::ORDER_ANALYTICS).await, 1);
    }

    #[tokio::test]
    async fn malformed_input_is_dead_lettered_and_skipped() {
        let broker = InMemoryBroker::new();
        let clock = ManualClock::default();
        let engine = engine(&broker, &clock);
        broker
            .publish(
                ProducerRecord::builder()
                    .topic(topic::ORDER_CREATED)
                    .key("bad")
                    .payload_raw(serde_json::json!({"not": "an order"}))
                    .build(),
            )
            .await
            .unwrap();
        publish_order(&broker, "CUST-1").await;

        assert_eq!(engine.run_catch_up().await.unwrap(), 2);
        let dead = broker.records(topic::ORDER_DEAD_LETTER).await;
        assert_eq!(dead.len(), 1);
        let letter: DeadLetter = dead[0].decode().unwrap();
        assert_eq!(letter.kind, FailureKind::Deserialization);
        assert_eq!(letter.consumer_group, ENGINE_NAME);
    }

    #[tokio::test]
    async fn punctuation_uses_the_clock() {
        let broker = InMemoryBroker::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 1, 0).unwrap();
        let clock = ManualClock::new(start);
        let engine = engine(&broker, &clock);

        let event = domain::OrderEvent::transition(
            domain::OrderId::new(),
            domain::event_types::ORDER_VALIDATED,
            domain::OrderStatus::Confirmed,
            domain::OrderStatus::Validated,
            "test",
            start,
        )
        .unwrap();
        broker
            .publish(
                ProducerRecord::builder()
                    .topic(topic::ORDER_EVENTS)
                    .key(event.order_id.as_str())
                    .timestamp(start)
                    .payload(&event)
                    .unwrap()
                    .build(),
            )
            .await
            .unwrap();
        engine.run_catch_up().await.unwrap();

        assert_eq!(engine.punctuate().await.unwrap(), 0);
        clock.advance(Duration::from_secs(5 * 60));
        assert_eq!(engine.punctuate().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn restore_without_checkpoint_reports_false() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker, &ManualClock::default());
        assert!(!engine.restore().await.unwrap());
    }
}
