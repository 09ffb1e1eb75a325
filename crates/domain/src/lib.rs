//! Domain model of the order fulfillment system.
//!
//! This crate provides the types that travel on the topics:
//! - [`Order`] with its status graph, pricing and validation rules
//! - [`OrderEvent`] audit records of status transitions
//! - [`Notification`] customer messages

pub mod error;
pub mod event;
pub mod notification;
pub mod order;

pub use common::OrderId;
pub use error::DomainError;
pub use event::{OrderEvent, event_types};
pub use notification::{Channel, Notification, NotificationStatus, NotificationType};
pub use order::{
    Address, CustomerId, DEFAULT_PAYMENT_METHOD, Money, Order, OrderBuilder, OrderItem,
    OrderPriority, OrderStatus, PaymentInfo, PaymentStatus, PriceOverrides, PricingPolicy,
    ProductId, Totals, ValidationFailure, ValidationRule, validate,
};
