//! Audit records of order status transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, OrderStatus};

/// Event type tags published on `order.events`.
pub mod event_types {
    pub const ORDER_CONFIRMED: &str = "ORDER_CONFIRMED";
    pub const ORDER_VALIDATED: &str = "ORDER_VALIDATED";
    pub const ORDER_VALIDATION_FAILED: &str = "ORDER_VALIDATION_FAILED";
    pub const INVENTORY_RESERVED: &str = "INVENTORY_RESERVED";
    pub const INVENTORY_UNAVAILABLE: &str = "INVENTORY_UNAVAILABLE";
    pub const INVENTORY_RELEASED: &str = "INVENTORY_RELEASED";
    pub const PAYMENT_PROCESSING: &str = "PAYMENT_PROCESSING";
    pub const PAYMENT_COMPLETED: &str = "PAYMENT_COMPLETED";
    pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
    pub const ORDER_READY_TO_SHIP: &str = "ORDER_READY_TO_SHIP";
    pub const ORDER_TRACKING_READY: &str = "ORDER_TRACKING_READY";
}

/// Immutable record of one status transition.
///
/// Created once per transition and never mutated afterwards. The
/// constructor refuses transitions that are not edges of the status graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_id: String,
    pub order_id: OrderId,

    /// Free-form tag, see [`event_types`].
    pub event_type: String,

    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,

    #[serde(default)]
    pub description: String,

    /// Name of the stage that made the transition.
    pub triggered_by: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OrderEvent {
    /// Records `previous -> new` for an order.
    pub fn transition(
        order_id: OrderId,
        event_type: impl Into<String>,
        previous: OrderStatus,
        new: OrderStatus,
        triggered_by: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !previous.can_transition_to(new) {
            return Err(DomainError::InvalidTransition {
                order_id: order_id.to_string(),
                from: previous,
                to: new,
            });
        }

        Ok(Self {
            event_id: Uuid::new_v4().to_string(),
            order_id,
            event_type: event_type.into(),
            previous_status: previous,
            new_status: new,
            description: String::new(),
            triggered_by: triggered_by.into(),
            timestamp,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if the recorded transition is an edge of the status graph.
    ///
    /// Always true for events built through [`OrderEvent::transition`]; useful
    /// for records read back from the wire.
    pub fn is_valid_transition(&self) -> bool {
        self.previous_status.can_transition_to(self.new_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_builds_event_for_graph_edge() {
        let event = OrderEvent::transition(
            OrderId::from("o-1"),
            event_types::ORDER_VALIDATED,
            OrderStatus::Confirmed,
            OrderStatus::Validated,
            "ValidationStage",
            Utc::now(),
        )
        .unwrap()
        .with_description("Order validation successful")
        .with_metadata("itemsCount", 2);

        assert_eq!(event.event_type, "ORDER_VALIDATED");
        assert_eq!(event.metadata["itemsCount"], 2);
        assert!(event.is_valid_transition());
    }

    #[test]
    fn transition_rejects_missing_edge() {
        let result = OrderEvent::transition(
            OrderId::from("o-1"),
            event_types::PAYMENT_COMPLETED,
            OrderStatus::Validated,
            OrderStatus::PaymentCompleted,
            "PaymentStage",
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[test]
    fn event_ids_are_unique() {
        let make = || {
            OrderEvent::transition(
                OrderId::from("o-1"),
                event_types::ORDER_CONFIRMED,
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                "ConfirmationStage",
                Utc::now(),
            )
            .unwrap()
        };
        assert_ne!(make().event_id, make().event_id);
    }

    #[test]
    fn wire_format_uses_camel_case_and_status_names() {
        let event = OrderEvent::transition(
            OrderId::from("o-1"),
            event_types::INVENTORY_RESERVED,
            OrderStatus::Validated,
            OrderStatus::InventoryReserved,
            "InventoryStage",
            Utc::now(),
        )
        .unwrap();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["previousStatus"], "VALIDATED");
        assert_eq!(json["newStatus"], "INVENTORY_RESERVED");
        assert_eq!(json["triggeredBy"], "InventoryStage");
        assert!(json.get("metadata").is_none());
    }
}
