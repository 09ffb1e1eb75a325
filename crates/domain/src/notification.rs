//! Customer notifications.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CustomerId, DomainError, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderConfirmation,
    OrderCancelled,
    PaymentSuccess,
    PaymentFailed,
    ShipmentCreated,
    OrderDelivered,
    RefundProcessed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::OrderConfirmation => "ORDER_CONFIRMATION",
            NotificationType::OrderCancelled => "ORDER_CANCELLED",
            NotificationType::PaymentSuccess => "PAYMENT_SUCCESS",
            NotificationType::PaymentFailed => "PAYMENT_FAILED",
            NotificationType::ShipmentCreated => "SHIPMENT_CREATED",
            NotificationType::OrderDelivered => "ORDER_DELIVERED",
            NotificationType::RefundProcessed => "REFUND_PROCESSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    #[default]
    Email,
    Sms,
    Push,
}

/// Delivery status. `Sent` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

/// A message to a customer about their order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: String,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub recipient: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub channel: Channel,
    pub subject: String,
    pub message: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// A pending email to the order's customer.
    pub fn for_order(
        order: &Order,
        notification_type: NotificationType,
        subject: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            recipient: order.customer_email.clone(),
            notification_type,
            channel: Channel::Email,
            subject: subject.into(),
            message: message.into(),
            status: NotificationStatus::Pending,
            created_at,
            sent_at: None,
        }
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.finish(NotificationStatus::Sent)?;
        self.sent_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        self.finish(NotificationStatus::Failed)
    }

    fn finish(&mut self, status: NotificationStatus) -> Result<(), DomainError> {
        if self.status != NotificationStatus::Pending {
            return Err(DomainError::NotificationFinal {
                notification_id: self.notification_id.clone(),
                status: self.status,
            });
        }
        self.status = status;
        Ok(())
    }
}
