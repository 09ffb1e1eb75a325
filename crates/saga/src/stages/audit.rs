use async_trait::async_trait;
use broker::Record;
use domain::OrderEvent;

use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::order_fulfillment::STAGE_AUDIT;

/// Logs the audit stream. Has no side effects besides the log lines, so
/// redelivery needs no deduplication.
#[derive(Debug, Default)]
pub struct AuditStage;

impl AuditStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for AuditStage {
    fn name(&self) -> &'static str {
        STAGE_AUDIT
    }

    async fn handle(&self, record: &Record) -> Result<()> {
        let event: OrderEvent = decode(record)?;
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            order_id = %event.order_id,
            from = %event.previous_status,
            to = %event.new_status,
            triggered_by = %event.triggered_by,
            partition = record.partition,
            offset = %record.offset,
            "order event"
        );
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_AUDIT, size = records.len()))]
    async fn handle_batch(&self, records: &[Record]) -> Vec<Result<()>> {
        tracing::info!("audit batch started");
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.handle(record).await);
        }
        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(failed, "audit batch finished");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use broker::{
        BrokerExt, DeadLetter, FailureKind, InMemoryBroker, MessageBroker, Offset, ProducerRecord,
        topic,
    };
    use chrono::Utc;
    use common::{ManualClock, ScriptedRandom};
    use domain::{OrderId, OrderStatus, event_types};

    use crate::order_fulfillment::{EVENT_LOG_GROUP, FulfillmentSettings};
    use crate::runtime::{ConsumerRuntime, StageRegistry, Subscription};

    async fn publish_event(broker: &InMemoryBroker, order_id: &str) {
        let event = OrderEvent::transition(
            OrderId::from_string(order_id),
            event_types::ORDER_CONFIRMED,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            "OrderConsumer",
            Utc::now(),
        )
        .unwrap();
        broker
            .publish_json(topic::ORDER_EVENTS, order_id, &event)
            .await
            .unwrap();
    }

    async fn publish_garbage(broker: &InMemoryBroker, key: &str) {
        broker
            .publish(
                ProducerRecord::builder()
                    .topic(topic::ORDER_EVENTS)
                    .key(key)
                    .payload_raw(serde_json::json!({"eventType": 42}))
                    .build(),
            )
            .await
            .unwrap();
    }

    fn runtime(broker: &InMemoryBroker) -> ConsumerRuntime<InMemoryBroker> {
        let mut registry = StageRegistry::new();
        registry.register(
            Subscription::new(topic::ORDER_EVENTS, EVENT_LOG_GROUP, 1, Arc::new(AuditStage::new()))
                .batched(),
        );
        ConsumerRuntime::new(
            broker.clone(),
            registry,
            Arc::new(ManualClock::default()),
            Arc::new(ScriptedRandom::constant(500)),
            FulfillmentSettings::default(),
        )
    }

    async fn total_records(broker: &InMemoryBroker) -> usize {
        let mut total = 0;
        for spec in topic::TOPICS {
            total += broker.record_count(spec.name).await;
        }
        total
    }

    #[tokio::test]
    async fn batch_fails_only_the_malformed_record() {
        let broker = InMemoryBroker::with_topics(&[topic::TopicSpec::new(topic::ORDER_EVENTS, 1)]);
        publish_event(&broker, "order-1").await;
        publish_garbage(&broker, "order-2").await;
        publish_event(&broker, "order-3").await;
        let records = broker.records(topic::ORDER_EVENTS).await;

        let results = AuditStage::new().handle_batch(&records).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn malformed_record_in_batch_is_dead_lettered_alone() {
        let broker = InMemoryBroker::new();
        publish_event(&broker, "order-1").await;
        publish_garbage(&broker, "order-1").await;
        publish_event(&broker, "order-1").await;

        runtime(&broker).drain().await.unwrap();

        let dead = broker.records(topic::ORDER_DEAD_LETTER).await;
        assert_eq!(dead.len(), 1);
        let letter: DeadLetter = dead[0].decode().unwrap();
        assert_eq!(letter.kind, FailureKind::Deserialization);
        assert_eq!(letter.stage, STAGE_AUDIT);
        assert_eq!(letter.source_offset, Offset::new(1));
        assert_eq!(broker.lag(EVENT_LOG_GROUP, topic::ORDER_EVENTS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replayed_event_has_no_side_effects() {
        let broker = InMemoryBroker::new();
        let runtime = runtime(&broker);
        publish_event(&broker, "order-1").await;

        runtime.drain().await.unwrap();
        let before = total_records(&broker).await;

        // Rewind the group so the same event is delivered again.
        for partition in 0..broker.partition_count(topic::ORDER_EVENTS).await.unwrap() {
            broker
                .commit(EVENT_LOG_GROUP, topic::ORDER_EVENTS, partition, Offset::initial())
                .await
                .unwrap();
        }
        assert_eq!(runtime.drain().await.unwrap(), 1);

        assert_eq!(total_records(&broker).await, before);
        assert_eq!(broker.record_count(topic::ORDER_DEAD_LETTER).await, 0);
    }
}
