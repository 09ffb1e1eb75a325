//! Outbound message paths shared by every stage.
//!
//! Stages never talk to each other directly; they publish through these
//! relays and the next stage picks the message up from its topic. Every
//! publish returns the broker's [`RecordMetadata`] or the error, so a failed
//! publish fails the handler instead of being lost.

use broker::{
    DeadLetter, FailureKind, MessageBroker, ProducerRecord, Record, RecordMetadata, topic,
};
use chrono::{DateTime, Utc};
use domain::{Notification, Order, OrderEvent};

use crate::error::{Result, StageError};
use crate::order_fulfillment::{
    HEADER_CUSTOMER_ID, HEADER_EVENT_TYPE, HEADER_PRIORITY, HEADER_TRACKING_ENABLED,
};

/// Appends audit records to `order.events`.
#[derive(Clone)]
pub struct EventPublisher<B> {
    broker: B,
}

impl<B: MessageBroker> EventPublisher<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    pub async fn publish(&self, event: &OrderEvent) -> Result<RecordMetadata> {
        let record = ProducerRecord::builder()
            .topic(topic::ORDER_EVENTS)
            .key(event.order_id.as_str())
            .header(HEADER_EVENT_TYPE, &event.event_type)
            .payload(event)?
            .build();

        match self.broker.publish(record).await {
            Ok(meta) => {
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    order_id = %event.order_id,
                    from = %event.previous_status,
                    to = %event.new_status,
                    partition = meta.partition,
                    offset = %meta.offset,
                    "order event published"
                );
                metrics::counter!("order_events_published_total", "event_type" => event.event_type.clone())
                    .increment(1);
                Ok(meta)
            }
            Err(e) => {
                tracing::error!(
                    event_type = %event.event_type,
                    order_id = %event.order_id,
                    error = %e,
                    "failed to publish order event"
                );
                Err(e.into())
            }
        }
    }
}

/// Queues customer notifications on `order.notifications`.
#[derive(Clone)]
pub struct NotificationDispatcher<B> {
    broker: B,
}

impl<B: MessageBroker> NotificationDispatcher<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    pub async fn dispatch(&self, notification: &Notification) -> Result<RecordMetadata> {
        let record = ProducerRecord::builder()
            .topic(topic::ORDER_NOTIFICATIONS)
            .key(&notification.notification_id)
            .payload(notification)?
            .build();

        let meta = self.broker.publish(record).await.inspect_err(|e| {
            tracing::error!(
                notification_id = %notification.notification_id,
                order_id = %notification.order_id,
                error = %e,
                "failed to queue notification"
            );
        })?;

        tracing::info!(
            notification_id = %notification.notification_id,
            order_id = %notification.order_id,
            notification_type = notification.notification_type.as_str(),
            "notification queued"
        );
        Ok(meta)
    }
}

/// Forwards orders to stage-input topics, keyed by order id.
#[derive(Clone)]
pub struct OrderRelay<B> {
    broker: B,
}

impl<B: MessageBroker> OrderRelay<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    /// Publishes an order to `topic` with extra headers.
    pub async fn send(
        &self,
        topic: &str,
        order: &Order,
        headers: &[(&str, &str)],
    ) -> Result<RecordMetadata> {
        let mut builder = ProducerRecord::builder()
            .topic(topic)
            .key(order.order_id.as_str())
            .payload(order)?;
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let meta = self
            .broker
            .publish(builder.build())
            .await
            .map_err(StageError::from)
            .inspect_err(|e| {
                tracing::error!(topic, order_id = %order.order_id, error = %e, "failed to relay order");
            })?;

        tracing::debug!(
            topic,
            order_id = %order.order_id,
            status = %order.status,
            partition = meta.partition,
            offset = %meta.offset,
            "order relayed"
        );
        Ok(meta)
    }

    /// Entry point of the workflow.
    pub async fn send_created(&self, order: &Order) -> Result<RecordMetadata> {
        self.send(
            topic::ORDER_CREATED,
            order,
            &[
                (HEADER_EVENT_TYPE, "ORDER_CREATED"),
                (HEADER_PRIORITY, order.priority.as_str()),
                (HEADER_CUSTOMER_ID, order.customer_id.as_str()),
            ],
        )
        .await
    }

    pub async fn send_validated(&self, order: &Order) -> Result<RecordMetadata> {
        self.send(topic::ORDER_VALIDATED, order, &[]).await
    }

    pub async fn send_to_inventory(&self, order: &Order) -> Result<RecordMetadata> {
        self.send(topic::ORDER_INVENTORY, order, &[]).await
    }

    pub async fn send_to_payment(&self, order: &Order) -> Result<RecordMetadata> {
        self.send(topic::ORDER_PAYMENT, order, &[]).await
    }

    pub async fn send_shipped(&self, order: &Order) -> Result<RecordMetadata> {
        self.send(
            topic::ORDER_SHIPPED,
            order,
            &[(HEADER_TRACKING_ENABLED, "true")],
        )
        .await
    }
}

/// Publishes poison records to `order.dead-letter`.
#[derive(Clone)]
pub struct DeadLetterRouter<B> {
    broker: B,
}

impl<B: MessageBroker> DeadLetterRouter<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn route(
        &self,
        record: &Record,
        group: &str,
        stage: &str,
        error: &StageError,
        attempts: u32,
        failed_at: DateTime<Utc>,
    ) -> Result<RecordMetadata> {
        let kind = if error.is_deserialization() {
            FailureKind::Deserialization
        } else {
            FailureKind::Processing
        };
        let dead = DeadLetter::from_record(
            record,
            group,
            stage,
            kind,
            error.to_string(),
            attempts,
            failed_at,
        );

        let meta = self.broker.publish(dead.to_producer_record()?).await?;

        tracing::warn!(
            source = %record.coordinates(),
            key = record.key.as_deref().unwrap_or(""),
            group,
            stage,
            kind = kind.as_str(),
            attempts,
            reason = %dead.reason,
            "record dead-lettered"
        );
        metrics::counter!("dead_letters_total", "stage" => stage.to_string()).increment(1);
        Ok(meta)
    }
}
