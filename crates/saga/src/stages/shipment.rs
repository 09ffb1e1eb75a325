use async_trait::async_trait;
use broker::{MessageBroker, Record};
use domain::{NotificationType, Order, OrderStatus, event_types};
use uuid::Uuid;

use super::{StageContext, expect_status};
use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::ProcessedLedger;
use crate::order_fulfillment::{HEADER_TRACKING_ENABLED, STAGE_SHIPMENT};

/// `TRK-` followed by 12 uppercase hex digits.
pub fn new_tracking_number() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TRK-{}", &hex[..12])
}

/// Hands paid orders to shipping: `PAYMENT_COMPLETED -> READY_TO_SHIP -> SHIPPED`.
pub struct ShipmentStage<B> {
    ctx: StageContext<B>,
    ledger: ProcessedLedger,
}

impl<B: MessageBroker + Clone> ShipmentStage<B> {
    pub fn new(ctx: StageContext<B>, ledger_capacity: usize) -> Self {
        Self {
            ctx,
            ledger: ProcessedLedger::new(ledger_capacity),
        }
    }
}

#[async_trait]
impl<B: MessageBroker + Clone + 'static> MessageHandler for ShipmentStage<B> {
    fn name(&self) -> &'static str {
        STAGE_SHIPMENT
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_SHIPMENT, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let mut order: Order = decode(record)?;
        if self.ledger.contains(order.order_id.as_str()) {
            tracing::debug!(order_id = %order.order_id, "duplicate delivery skipped");
            return Ok(());
        }
        expect_status(&order, OrderStatus::PaymentCompleted)?;

        tracing::info!(
            order_id = %order.order_id,
            customer = %order.customer_name,
            tracking = record.header(HEADER_TRACKING_ENABLED).unwrap_or("false"),
            "order received for shipment"
        );

        let ready = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::ReadyToShip,
                event_types::ORDER_READY_TO_SHIP,
                STAGE_SHIPMENT,
            )?
            .with_description("Order ready for shipment");

        let tracking_number = new_tracking_number();
        let shipped = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Shipped,
                event_types::ORDER_TRACKING_READY,
                STAGE_SHIPMENT,
            )?
            .with_description("Order shipped and tracking available")
            .with_metadata("trackingNumber", tracking_number.as_str());

        self.ctx.events.publish(&ready).await?;
        self.ctx.events.publish(&shipped).await?;
        self.ctx
            .notify(
                &order,
                NotificationType::ShipmentCreated,
                "Your order has shipped",
                format!(
                    "Your order {} has shipped. Tracking number: {tracking_number}",
                    order.order_id
                ),
            )
            .await?;

        self.ledger.mark(order.order_id.as_str());
        tracing::info!(order_id = %order.order_id, tracking_number, "order shipped");
        Ok(())
    }
}
