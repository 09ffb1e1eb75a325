//! Order status graph.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ─► Confirmed ─► Validated ─► InventoryReserved ─► PaymentProcessing ─┬─► PaymentCompleted ─► ReadyToShip ─► Shipped
///    │           │            │                │                   │          └─► PaymentFailed
///    │           │            │                │                   │                  │
///    └───────────┴────────────┴────────────────┴───────────────────┴──────────────────┴──► Cancelled
/// ```
///
/// Every non-terminal status may also move to `Cancelled`, including
/// `PaymentCompleted` and `ReadyToShip`. `Cancelled` and `Shipped` are
/// terminal. The graph is acyclic, so no path revisits a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted at ingress, not yet processed by any stage.
    #[default]
    Pending,
    Confirmed,
    /// Passed every business rule.
    Validated,
    InventoryReserved,
    PaymentProcessing,
    PaymentCompleted,
    /// Payment declined; awaiting compensation.
    PaymentFailed,
    Cancelled,
    ReadyToShip,
    Shipped,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Validated,
        OrderStatus::InventoryReserved,
        OrderStatus::PaymentProcessing,
        OrderStatus::PaymentCompleted,
        OrderStatus::PaymentFailed,
        OrderStatus::Cancelled,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
    ];

    /// Forward successors, not counting the cancellation edge.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed],
            OrderStatus::Confirmed => &[OrderStatus::Validated],
            OrderStatus::Validated => &[OrderStatus::InventoryReserved],
            OrderStatus::InventoryReserved => &[OrderStatus::PaymentProcessing],
            OrderStatus::PaymentProcessing => {
                &[OrderStatus::PaymentCompleted, OrderStatus::PaymentFailed]
            }
            OrderStatus::PaymentCompleted => &[OrderStatus::ReadyToShip],
            OrderStatus::ReadyToShip => &[OrderStatus::Shipped],
            OrderStatus::PaymentFailed | OrderStatus::Cancelled | OrderStatus::Shipped => &[],
        }
    }

    /// Returns true if `next` is an edge of the status graph.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if next == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        self.successors().contains(&next)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Shipped)
    }

    /// Returns true if consecutive statuses are all graph edges.
    pub fn is_valid_path(path: &[OrderStatus]) -> bool {
        path.windows(2).all(|w| w[0].can_transition_to(w[1]))
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Validated => "VALIDATED",
            OrderStatus::InventoryReserved => "INVENTORY_RESERVED",
            OrderStatus::PaymentProcessing => "PAYMENT_PROCESSING",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::ReadyToShip => "READY_TO_SHIP",
            OrderStatus::Shipped => "SHIPPED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fulfillment priority requested by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPriority {
    #[default]
    Normal,
    Express,
}

impl OrderPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPriority::Normal => "NORMAL",
            OrderPriority::Express => "EXPRESS",
        }
    }
}

impl std::fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
