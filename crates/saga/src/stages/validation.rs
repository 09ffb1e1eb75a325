use async_trait::async_trait;
use broker::{MessageBroker, Record};
use domain::{NotificationType, Order, OrderStatus, event_types, validate};

use super::StageContext;
use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::ProcessedLedger;
use crate::order_fulfillment::STAGE_VALIDATION;

/// Applies the business rules and routes the order on or cancels it.
pub struct ValidationStage<B> {
    ctx: StageContext<B>,
    ledger: ProcessedLedger,
}

impl<B: MessageBroker + Clone> ValidationStage<B> {
    pub fn new(ctx: StageContext<B>, ledger_capacity: usize) -> Self {
        Self {
            ctx,
            ledger: ProcessedLedger::new(ledger_capacity),
        }
    }

    async fn accept(&self, mut order: Order) -> Result<()> {
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Validated,
                event_types::ORDER_VALIDATED,
                STAGE_VALIDATION,
            )?
            .with_description("Order validation successful");

        self.ctx.orders.send_validated(&order).await?;
        self.ctx.orders.send_to_inventory(&order).await?;
        self.ctx.events.publish(&event).await?;

        tracing::info!(order_id = %order.order_id, "order validated");
        Ok(())
    }

    async fn reject(&self, mut order: Order, reason: &str) -> Result<()> {
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Cancelled,
                event_types::ORDER_VALIDATION_FAILED,
                STAGE_VALIDATION,
            )?
            .with_description(format!("Validation failed: {reason}"))
            .with_metadata("reason", reason);
        self.ctx.events.publish(&event).await?;

        self.ctx
            .notify(
                &order,
                NotificationType::OrderCancelled,
                "Order Cancelled - Validation Failed",
                format!("Your order {} was cancelled: {reason}", order.order_id),
            )
            .await?;

        tracing::warn!(order_id = %order.order_id, reason, "order failed validation");
        metrics::counter!("orders_rejected_total", "reason" => "validation").increment(1);
        Ok(())
    }
}

#[async_trait]
impl<B: MessageBroker + Clone + 'static> MessageHandler for ValidationStage<B> {
    fn name(&self) -> &'static str {
        STAGE_VALIDATION
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_VALIDATION, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let mut order: Order = decode(record)?;
        if self.ledger.contains(order.order_id.as_str()) {
            tracing::debug!(order_id = %order.order_id, "duplicate delivery skipped");
            return Ok(());
        }

        // Read straight off order.created; confirmation runs in its own group.
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Confirmed;
        }
        super::expect_status(&order, OrderStatus::Confirmed)?;

        let order_id = order.order_id.clone();
        match validate(&order) {
            Ok(()) => self.accept(order).await?,
            Err(failure) => self.reject(order, failure.reason()).await?,
        }

        self.ledger.mark(order_id.as_str());
        Ok(())
    }
}
