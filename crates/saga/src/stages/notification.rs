use std::sync::Arc;

use async_trait::async_trait;
use broker::Record;
use common::Clock;
use domain::Notification;

use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::ProcessedLedger;
use crate::order_fulfillment::STAGE_NOTIFICATION;
use crate::services::NotificationChannel;

/// Delivers queued notifications. Delivery failures are final.
pub struct NotificationStage {
    channel: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    ledger: ProcessedLedger,
}

impl NotificationStage {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        ledger_capacity: usize,
    ) -> Self {
        Self {
            channel,
            clock,
            ledger: ProcessedLedger::new(ledger_capacity),
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationStage {
    fn name(&self) -> &'static str {
        STAGE_NOTIFICATION
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_NOTIFICATION, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let mut notification: Notification = decode(record)?;
        if !self.ledger.mark(&notification.notification_id) {
            tracing::debug!(
                notification_id = %notification.notification_id,
                "duplicate delivery skipped"
            );
            return Ok(());
        }

        match self.channel.deliver(&notification).await {
            Ok(()) => {
                notification.mark_sent(self.clock.now())?;
                tracing::info!(
                    notification_id = %notification.notification_id,
                    order_id = %notification.order_id,
                    notification_type = notification.notification_type.as_str(),
                    recipient = %notification.recipient,
                    "notification delivered"
                );
                metrics::counter!("notifications_sent_total").increment(1);
            }
            Err(e) => {
                notification.mark_failed()?;
                tracing::error!(
                    notification_id = %notification.notification_id,
                    order_id = %notification.order_id,
                    error = %e,
                    "notification delivery failed"
                );
                metrics::counter!("notifications_failed_total").increment(1);
            }
        }
        Ok(())
    }
}
