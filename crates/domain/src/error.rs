//! Domain error types.

use thiserror::Error;

use crate::{NotificationStatus, OrderStatus};

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The transition is not an edge of the order status graph.
    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A notification already reached a final status.
    #[error("Notification {notification_id} is already {status:?}")]
    NotificationFinal {
        notification_id: String,
        status: NotificationStatus,
    },

    /// A monetary amount could not be parsed, or arithmetic on amounts
    /// overflowed.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
