use std::sync::Arc;

use async_trait::async_trait;
use broker::{MessageBroker, Record};
use domain::{NotificationType, Order, OrderStatus, event_types};

use super::{StageContext, expect_status, quantity_metadata};
use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::ProcessedLedger;
use crate::order_fulfillment::STAGE_INVENTORY;
use crate::services::{Availability, AvailabilityPolicy};

/// Reserves stock for validated orders.
pub struct InventoryStage<B> {
    ctx: StageContext<B>,
    policy: Arc<dyn AvailabilityPolicy>,
    ledger: ProcessedLedger,
}

impl<B: MessageBroker + Clone> InventoryStage<B> {
    pub fn new(
        ctx: StageContext<B>,
        policy: Arc<dyn AvailabilityPolicy>,
        ledger_capacity: usize,
    ) -> Self {
        Self {
            ctx,
            policy,
            ledger: ProcessedLedger::new(ledger_capacity),
        }
    }

    async fn reserved(&self, mut order: Order) -> Result<()> {
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::InventoryReserved,
                event_types::INVENTORY_RESERVED,
                STAGE_INVENTORY,
            )?
            .with_description("Inventory reserved successfully");
        let event = quantity_metadata(event, &order);

        self.ctx.orders.send_to_payment(&order).await?;
        self.ctx.events.publish(&event).await?;

        tracing::info!(order_id = %order.order_id, "inventory reserved");
        Ok(())
    }

    async fn unavailable(&self, mut order: Order) -> Result<()> {
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Cancelled,
                event_types::INVENTORY_UNAVAILABLE,
                STAGE_INVENTORY,
            )?
            .with_description("Inventory not available for order items");
        self.ctx.events.publish(&event).await?;

        self.ctx
            .notify(
                &order,
                NotificationType::OrderCancelled,
                "Order Cancelled - Out of Stock",
                format!(
                    "Your order {} was cancelled because some items are out of stock.",
                    order.order_id
                ),
            )
            .await?;

        tracing::warn!(order_id = %order.order_id, "inventory unavailable");
        metrics::counter!("orders_rejected_total", "reason" => "inventory").increment(1);
        Ok(())
    }
}

#[async_trait]
impl<B: MessageBroker + Clone + 'static> MessageHandler for InventoryStage<B> {
    fn name(&self) -> &'static str {
        STAGE_INVENTORY
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_INVENTORY, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let order: Order = decode(record)?;
        if self.ledger.contains(order.order_id.as_str()) {
            tracing::debug!(order_id = %order.order_id, "duplicate delivery skipped");
            return Ok(());
        }
        expect_status(&order, OrderStatus::Validated)?;

        tracing::info!(
            order_id = %order.order_id,
            items = order.item_count(),
            "checking inventory"
        );

        let order_id = order.order_id.clone();
        match self.policy.reserve(&order).await? {
            Availability::Available => self.reserved(order).await?,
            Availability::Unavailable => self.unavailable(order).await?,
        }

        self.ledger.mark(order_id.as_str());
        Ok(())
    }
}
