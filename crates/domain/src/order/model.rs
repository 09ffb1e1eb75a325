use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{
    payment::PaymentInfo,
    pricing::{PriceOverrides, PricingPolicy, Totals},
    status::{OrderPriority, OrderStatus},
    value_objects::{Address, CustomerId, Money, OrderItem},
};
use crate::DomainError;

/// An order as it travels between stages.
///
/// Each stage receives its own copy, moves it along the status graph and
/// forwards it; no two stages own the same order at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub phone_number: Option<String>,

    pub items: Vec<OrderItem>,

    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    #[serde(default)]
    pub discount_amount: Money,

    pub status: OrderStatus,
    #[serde(default)]
    pub priority: OrderPriority,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub payment_info: PaymentInfo,

    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

impl Order {
    pub fn builder() -> OrderBuilder {
        OrderBuilder::default()
    }

    /// Moves the order along one edge of the status graph.
    ///
    /// Returns the previous status.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<OrderStatus, DomainError> {
        let previous = self.status;
        if !previous.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                order_id: self.order_id.to_string(),
                from: previous,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(previous)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of the item totals as carried on the items.
    pub fn items_total(&self) -> Result<Money, DomainError> {
        Money::checked_sum(self.items.iter().map(|item| item.total_price))
    }

    /// `subtotal + tax + shipping - discount`.
    pub fn expected_total(&self) -> Result<Money, DomainError> {
        self.subtotal
            .checked_add(self.tax_amount)?
            .checked_add(self.shipping_cost)?
            .checked_sub(self.discount_amount)
    }

    /// Ordered quantity per product, summed over repeated lines.
    pub fn quantities_by_product(&self) -> BTreeMap<String, u32> {
        let mut quantities = BTreeMap::new();
        for item in &self.items {
            let quantity = quantities.entry(item.product_id.to_string()).or_insert(0u32);
            *quantity = quantity.saturating_add(item.quantity);
        }
        quantities
    }
}

/// Builder for [`Order`]s entering the system.
///
/// Item totals, subtotal, tax, shipping and total are computed through a
/// [`PricingPolicy`], so a built order always satisfies the amount invariants.
#[derive(Debug, Default)]
pub struct OrderBuilder {
    order_id: Option<OrderId>,
    customer_id: Option<CustomerId>,
    customer_name: String,
    customer_email: String,
    phone_number: Option<String>,
    items: Vec<OrderItem>,
    overrides: PriceOverrides,
    pricing: PricingPolicy,
    priority: OrderPriority,
    created_at: Option<DateTime<Utc>>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    payment_info: Option<PaymentInfo>,
    notes: Option<String>,
    coupon_code: Option<String>,
}

impl OrderBuilder {
    /// Sets the order ID. If not set, a new ID will be generated.
    pub fn order_id(mut self, id: impl Into<OrderId>) -> Self {
        self.order_id = Some(id.into());
        self
    }

    pub fn customer(
        mut self,
        id: impl Into<CustomerId>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.customer_id = Some(id.into());
        self.customer_name = name.into();
        self.customer_email = email.into();
        self
    }

    pub fn phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Adds a line; its total is recomputed from unit price and quantity.
    pub fn item(mut self, mut item: OrderItem) -> Self {
        item.total_price = item.unit_price.multiply(item.quantity);
        self.items.push(item);
        self
    }

    pub fn items(self, items: impl IntoIterator<Item = OrderItem>) -> Self {
        items.into_iter().fold(self, |builder, item| builder.item(item))
    }

    pub fn tax_amount(mut self, amount: Money) -> Self {
        self.overrides.tax_amount = Some(amount);
        self
    }

    pub fn shipping_cost(mut self, amount: Money) -> Self {
        self.overrides.shipping_cost = Some(amount);
        self
    }

    pub fn discount_amount(mut self, amount: Money) -> Self {
        self.overrides.discount_amount = Some(amount);
        self
    }

    pub fn overrides(mut self, overrides: PriceOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn pricing(mut self, pricing: PricingPolicy) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn priority(mut self, priority: OrderPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn shipping_address(mut self, address: Address) -> Self {
        self.shipping_address = Some(address);
        self
    }

    pub fn billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    pub fn payment_info(mut self, info: PaymentInfo) -> Self {
        self.payment_info = Some(info);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn coupon_code(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    /// Builds a `PENDING` order.
    ///
    /// Amounts saturate on overflow; use [`OrderBuilder::try_build`] for
    /// amounts from outside the process.
    pub fn build(self) -> Order {
        let totals = self.pricing.saturating_totals(&self.items, self.overrides);
        self.finish(totals)
    }

    /// Builds a `PENDING` order, failing with
    /// [`DomainError::InvalidAmount`] if any amount overflows.
    pub fn try_build(self) -> Result<Order, DomainError> {
        for item in &self.items {
            item.computed_total()?;
        }
        let totals = self.pricing.totals(&self.items, self.overrides)?;
        Ok(self.finish(totals))
    }

    fn finish(self, totals: Totals) -> Order {
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Order {
            order_id: self.order_id.unwrap_or_default(),
            customer_id: self.customer_id.unwrap_or_else(CustomerId::generate),
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            phone_number: self.phone_number,
            items: self.items,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            shipping_cost: totals.shipping_cost,
            total_amount: totals.total_amount,
            discount_amount: totals.discount_amount,
            status: OrderStatus::Pending,
            priority: self.priority,
            created_at,
            updated_at: created_at,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            payment_info: self.payment_info.unwrap_or_default(),
            notes: self.notes,
            coupon_code: self.coupon_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Order {
        Order::builder()
            .order_id("order-1")
            .customer("CUST-1", "Ada Lovelace", "ada@example.com")
            .item(OrderItem::new("P-1", "Widget", 2, Money::from_dollars(100)))
            .tax_amount(Money::from_dollars(40))
            .shipping_cost(Money::from_dollars(10))
            .shipping_address(Address::new("1 Main St", "Springfield", "IL", "62701", "USA"))
            .build()
    }

    #[test]
    fn builder_computes_amounts() {
        let order = sample();
        assert_eq!(order.subtotal, Money::from_dollars(200));
        assert_eq!(order.total_amount, Money::from_dollars(250));
        assert_eq!(order.items_total().unwrap(), order.subtotal);
        assert_eq!(order.expected_total().unwrap(), order.total_amount);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.priority, OrderPriority::Normal);
    }

    #[test]
    fn builder_recomputes_item_totals() {
        let mut item = OrderItem::new("P-1", "Widget", 2, Money::from_dollars(5));
        item.total_price = Money::from_dollars(999);

        let order = Order::builder()
            .customer("CUST-1", "Ada", "ada@example.com")
            .item(item)
            .build();
        assert_eq!(order.items[0].total_price, Money::from_dollars(10));
    }

    #[test]
    fn try_build_rejects_overflowing_line_total() {
        let unit_price: Money = "90000000000000000.00".parse().unwrap();
        let err = Order::builder()
            .customer("CUST-1", "Ada", "ada@example.com")
            .item(OrderItem::new("P-1", "Widget", 2, unit_price))
            .try_build()
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }

    #[test]
    fn try_build_accepts_ordinary_amounts() {
        let order = Order::builder()
            .customer("CUST-1", "Ada", "ada@example.com")
            .item(OrderItem::new("P-1", "Widget", 2, Money::from_dollars(100)))
            .try_build()
            .unwrap();
        assert_eq!(order.subtotal, Money::from_dollars(200));
    }

    #[test]
    fn transition_follows_graph() {
        let mut order = sample();
        let at = Utc::now();

        let previous = order.transition_to(OrderStatus::Confirmed, at).unwrap();
        assert_eq!(previous, OrderStatus::Pending);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.updated_at, at);

        let err = order
            .transition_to(OrderStatus::PaymentCompleted, at)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn quantities_are_summed_per_product() {
        let order = Order::builder()
            .customer("CUST-1", "Ada", "ada@example.com")
            .item(OrderItem::new("P-1", "Widget", 2, Money::from_dollars(1)))
            .item(OrderItem::new("P-2", "Gadget", 1, Money::from_dollars(1)))
            .item(OrderItem::new("P-1", "Widget", 3, Money::from_dollars(1)))
            .build();

        let quantities = order.quantities_by_product();
        assert_eq!(quantities["P-1"], 5);
        assert_eq!(quantities["P-2"], 1);
    }

    #[test]
    fn wire_format_matches_camel_case_schema() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["orderId"], "order-1");
        assert_eq!(json["customerEmail"], "ada@example.com");
        assert_eq!(json["totalAmount"], "250.00");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["paymentInfo"]["paymentMethod"], "CREDIT_CARD");
        assert_eq!(json["shippingAddress"]["street"], "1 Main St");

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_with_times(&back));
    }

    fn sample_with_times(reference: &Order) -> Order {
        let mut order = sample();
        order.created_at = reference.created_at;
        order.updated_at = reference.updated_at;
        order.items = reference.items.clone();
        order
    }

    #[test]
    fn minimal_payload_deserializes_with_defaults() {
        let json = serde_json::json!({
            "orderId": "o-1",
            "customerId": "CUST-9",
            "customerName": "Grace",
            "customerEmail": "grace@example.com",
            "items": [{
                "itemId": "i-1",
                "productId": "P-1",
                "productName": "Widget",
                "quantity": 1,
                "unitPrice": 12.5,
                "totalPrice": 12.5
            }],
            "subtotal": 12.5,
            "taxAmount": 2.5,
            "shippingCost": 10,
            "totalAmount": 25,
            "status": "PENDING",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });

        let order: Order = serde_json::from_value(json).unwrap();
        assert_eq!(order.subtotal, Money::from_cents(1250));
        assert_eq!(order.discount_amount, Money::zero());
        assert_eq!(order.priority, OrderPriority::Normal);
        assert!(order.shipping_address.is_none());
        assert_eq!(order.expected_total().unwrap(), order.total_amount);
    }
}
