//! Integration tests for the order model.
//!
//! These tests exercise pricing, validation, the status graph and the wire
//! format together, the way the fulfillment stages use them.

use chrono::Utc;
use domain::{
    Address, DomainError, Money, Notification, NotificationStatus, NotificationType, Order,
    OrderEvent, OrderItem, OrderStatus, PaymentStatus, ValidationRule, event_types, validate,
};

fn address() -> Address {
    Address::new("742 Evergreen Terrace", "Springfield", "OR", "97403", "USA")
}

/// One item `{unitPrice=100, quantity=2}`, tax 40, shipping 10, no discount.
fn reference_order() -> Order {
    Order::builder()
        .customer("CUST-0001", "Marge Simpson", "marge@example.com")
        .item(OrderItem::new("P-1", "Blender", 2, Money::from_dollars(100)))
        .tax_amount(Money::from_dollars(40))
        .shipping_cost(Money::from_dollars(10))
        .shipping_address(address())
        .build()
}

mod amounts {
    use super::*;

    #[test]
    fn reference_order_totals() {
        let order = reference_order();
        assert_eq!(order.subtotal, Money::from_dollars(200));
        assert_eq!(order.total_amount, Money::from_dollars(250));
        assert!(validate(&order).is_ok());
    }

    #[test]
    fn built_orders_always_satisfy_amount_invariants() {
        for n in 1..40u32 {
            let order = Order::builder()
                .customer("CUST-0002", "Bart", "bart@example.com")
                .items((0..n % 7 + 1).map(|i| {
                    OrderItem::new(
                        format!("P-{i}"),
                        "Thing",
                        i % 4 + 1,
                        Money::from_cents(i64::from(n * 37 + i * 101)),
                    )
                }))
                .discount_amount(Money::from_cents(i64::from(n)))
                .shipping_address(address())
                .build();

            assert_eq!(order.subtotal, order.items_total().unwrap());
            assert_eq!(order.total_amount, order.expected_total().unwrap());
            assert!(validate(&order).is_ok(), "order {n} failed validation");
        }
    }

    #[test]
    fn tampered_wire_amounts_are_rejected_without_tolerance() {
        let mut json = serde_json::to_value(reference_order()).unwrap();
        json["subtotal"] = serde_json::json!("200.01");

        let order: Order = serde_json::from_value(json).unwrap();
        assert_eq!(
            validate(&order).unwrap_err().rule,
            ValidationRule::SubtotalMatchesItems
        );
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn happy_path_produces_a_valid_event_chain() {
        let mut order = reference_order();
        let steps = [
            (OrderStatus::Confirmed, event_types::ORDER_CONFIRMED),
            (OrderStatus::Validated, event_types::ORDER_VALIDATED),
            (OrderStatus::InventoryReserved, event_types::INVENTORY_RESERVED),
            (OrderStatus::PaymentProcessing, event_types::PAYMENT_PROCESSING),
            (OrderStatus::PaymentCompleted, event_types::PAYMENT_COMPLETED),
            (OrderStatus::ReadyToShip, event_types::ORDER_READY_TO_SHIP),
            (OrderStatus::Shipped, event_types::ORDER_TRACKING_READY),
        ];

        let mut events = Vec::new();
        for (next, event_type) in steps {
            let at = Utc::now();
            let previous = order.transition_to(next, at).unwrap();
            events.push(
                OrderEvent::transition(
                    order.order_id.clone(),
                    event_type,
                    previous,
                    next,
                    "test",
                    at,
                )
                .unwrap(),
            );
        }

        let mut path = vec![events[0].previous_status];
        path.extend(events.iter().map(|e| e.new_status));
        assert!(OrderStatus::is_valid_path(&path));
        assert!(order.status.is_terminal());
    }

    #[test]
    fn payment_failure_then_compensation() {
        let mut order = reference_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Validated,
            OrderStatus::InventoryReserved,
            OrderStatus::PaymentProcessing,
            OrderStatus::PaymentFailed,
        ] {
            order.transition_to(next, Utc::now()).unwrap();
        }
        order.payment_info.decline();

        assert!(!order.status.is_terminal());
        order
            .transition_to(OrderStatus::Cancelled, Utc::now())
            .unwrap();
        assert_eq!(order.payment_info.payment_status, PaymentStatus::Declined);

        let err = order
            .transition_to(OrderStatus::Confirmed, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }
}

mod notifications {
    use super::*;

    #[test]
    fn cancellation_notice_round_trips_through_json() {
        let order = reference_order();
        let mut notice = Notification::for_order(
            &order,
            NotificationType::OrderCancelled,
            "Order Cancelled - Validation Failed",
            format!("Your order {} was cancelled: Subtotal mismatch", order.order_id),
            Utc::now(),
        );

        let json = serde_json::to_string(&notice).unwrap();
        let mut back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, notice);

        back.mark_sent(Utc::now()).unwrap();
        notice.mark_failed().unwrap();
        assert_eq!(back.status, NotificationStatus::Sent);
        assert_eq!(notice.status, NotificationStatus::Failed);
    }
}
