use async_trait::async_trait;
use broker::{MessageBroker, Record};
use domain::{Order, OrderStatus, event_types};

use super::{StageContext, record_millis};
use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::ProcessedLedger;
use crate::order_fulfillment::{HEADER_PRIORITY, STAGE_CONFIRMATION};

/// Acknowledges newly created orders: `PENDING -> CONFIRMED`.
pub struct ConfirmationStage<B> {
    ctx: StageContext<B>,
    ledger: ProcessedLedger,
}

impl<B: MessageBroker + Clone> ConfirmationStage<B> {
    pub fn new(ctx: StageContext<B>, ledger_capacity: usize) -> Self {
        Self {
            ctx,
            ledger: ProcessedLedger::new(ledger_capacity),
        }
    }
}

#[async_trait]
impl<B: MessageBroker + Clone + 'static> MessageHandler for ConfirmationStage<B> {
    fn name(&self) -> &'static str {
        STAGE_CONFIRMATION
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_CONFIRMATION, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let mut order: Order = decode(record)?;
        if self.ledger.contains(order.order_id.as_str()) {
            tracing::debug!(order_id = %order.order_id, "duplicate delivery skipped");
            return Ok(());
        }

        tracing::info!(
            order_id = %order.order_id,
            customer = %order.customer_name,
            partition = record.partition,
            offset = %record.offset,
            priority = record.header(HEADER_PRIORITY).unwrap_or("NORMAL"),
            "order received"
        );

        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Confirmed,
                event_types::ORDER_CONFIRMED,
                STAGE_CONFIRMATION,
            )?
            .with_description("Order received and confirmed")
            .with_metadata("partition", record.partition)
            .with_metadata("offset", record.offset.as_i64())
            .with_metadata("timestamp", record_millis(record))
            .with_metadata("itemsCount", order.item_count());
        self.ctx.events.publish(&event).await?;

        self.ledger.mark(order.order_id.as_str());
        tracing::info!(order_id = %order.order_id, "order confirmed");
        Ok(())
    }
}
