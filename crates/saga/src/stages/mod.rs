//! Stage handlers of the fulfillment workflow.
//!
//! Each stage consumes one topic under its own consumer group, moves the
//! order one or more steps along the status graph, records every step on
//! `order.events` and forwards the order to the next stage's topic.

mod audit;
mod confirmation;
mod inventory;
mod notification;
mod payment;
mod shipment;
mod validation;

use std::sync::Arc;

use broker::{MessageBroker, Record};
use common::Clock;
use domain::{Notification, NotificationType, Order, OrderEvent, OrderStatus};

pub use audit::AuditStage;
pub use confirmation::ConfirmationStage;
pub use inventory::InventoryStage;
pub use notification::NotificationStage;
pub use payment::PaymentStage;
pub use shipment::ShipmentStage;
pub use validation::ValidationStage;

use crate::error::{Result, StageError};
use crate::relay::{EventPublisher, NotificationDispatcher, OrderRelay};

/// Outbound paths and time source shared by the order stages.
#[derive(Clone)]
pub struct StageContext<B> {
    pub events: EventPublisher<B>,
    pub notifications: NotificationDispatcher<B>,
    pub orders: OrderRelay<B>,
    pub clock: Arc<dyn Clock>,
}

impl<B: MessageBroker + Clone> StageContext<B> {
    pub fn new(broker: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            events: EventPublisher::new(broker.clone()),
            notifications: NotificationDispatcher::new(broker.clone()),
            orders: OrderRelay::new(broker),
            clock,
        }
    }

    /// Moves `order` to `next` and builds the matching audit event.
    ///
    /// The event is not published; callers attach metadata first.
    pub fn transition(
        &self,
        order: &mut Order,
        next: OrderStatus,
        event_type: &str,
        triggered_by: &str,
    ) -> Result<OrderEvent> {
        let now = self.clock.now();
        let previous = order.transition_to(next, now)?;
        Ok(OrderEvent::transition(
            order.order_id.clone(),
            event_type,
            previous,
            next,
            triggered_by,
            now,
        )?)
    }

    /// Queues a notification to the order's customer.
    pub async fn notify(
        &self,
        order: &Order,
        notification_type: NotificationType,
        subject: &str,
        message: String,
    ) -> Result<()> {
        let notification =
            Notification::for_order(order, notification_type, subject, message, self.clock.now());
        self.notifications.dispatch(&notification).await?;
        Ok(())
    }
}

/// Fails unless the order is in `expected`.
pub(crate) fn expect_status(order: &Order, expected: OrderStatus) -> Result<()> {
    if order.status != expected {
        return Err(StageError::UnexpectedStatus {
            order_id: order.order_id.to_string(),
            expected,
            actual: order.status,
        });
    }
    Ok(())
}

/// Metadata entry `productId -> quantity` for every ordered product.
pub(crate) fn quantity_metadata(mut event: OrderEvent, order: &Order) -> OrderEvent {
    for (product, quantity) in order.quantities_by_product() {
        event = event.with_metadata(product, quantity);
    }
    event
}

pub(crate) fn record_millis(record: &Record) -> i64 {
    record.timestamp.timestamp_millis()
}
