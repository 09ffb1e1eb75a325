//! Order ingress endpoints.

use std::sync::Arc;

use analytics::OrderAnalytics;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use broker::MessageBroker;
use chrono::{DateTime, Duration, Utc};
use common::Clock;
use domain::{
    Address, CustomerId, DomainError, Money, Order, OrderItem, OrderPriority, OrderStatus, PaymentInfo,
    PriceOverrides, PricingPolicy,
};
use saga::OrderRelay;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<B> {
    pub relay: OrderRelay<B>,
    pub analytics: OrderAnalytics,
    pub clock: Arc<dyn Clock>,
    pub pricing: PricingPolicy,
    /// Number of stage subscriptions the consumer runtime drives.
    pub subscriptions: usize,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    pub phone_number: Option<String>,
    pub items: Vec<OrderItemRequest>,
    pub tax_amount: Option<Money>,
    pub shipping_cost: Option<Money>,
    pub discount_amount: Option<Money>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub payment_info: Option<PaymentInfo>,
    pub priority: Option<OrderPriority>,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub category: Option<String>,
    pub weight: Option<f64>,
}

impl OrderItemRequest {
    fn into_item(self) -> OrderItem {
        let mut item = OrderItem::new(self.product_id, self.product_name, self.quantity, self.unit_price);
        if let Some(sku) = self.sku {
            item = item.with_sku(sku);
        }
        if let Some(category) = self.category {
            item = item.with_category(category);
        }
        if let Some(weight) = self.weight {
            item = item.with_weight(weight);
        }
        item
    }
}

impl CreateOrderRequest {
    /// Builds a `PENDING` order with a fresh id and computed amounts.
    ///
    /// Fails if an amount overflows.
    pub fn into_order(self, pricing: PricingPolicy, now: DateTime<Utc>) -> Result<Order, DomainError> {
        let mut builder = Order::builder()
            .customer(
                self.customer_id.unwrap_or_else(CustomerId::generate),
                self.customer_name,
                self.customer_email,
            )
            .items(self.items.into_iter().map(OrderItemRequest::into_item))
            .overrides(PriceOverrides {
                tax_amount: self.tax_amount,
                shipping_cost: self.shipping_cost,
                discount_amount: self.discount_amount,
            })
            .pricing(pricing)
            .priority(self.priority.unwrap_or_default())
            .created_at(now);

        if let Some(phone) = self.phone_number {
            builder = builder.phone_number(phone);
        }
        if let Some(address) = self.shipping_address {
            builder = builder.shipping_address(address);
        }
        if let Some(address) = self.billing_address {
            builder = builder.billing_address(address);
        }
        if let Some(payment) = self.payment_info {
            builder = builder.payment_info(payment);
        }
        if let Some(notes) = self.notes {
            builder = builder.notes(notes);
        }
        if let Some(code) = self.coupon_code {
            builder = builder.coupon_code(code);
        }
        builder.try_build()
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub message: &'static str,
    pub estimated_delivery: DateTime<Utc>,
}

// -- Handlers --

/// POST /api/orders: accept an order and publish it to `order.created`.
#[tracing::instrument(skip_all)]
pub async fn create<B: MessageBroker + 'static>(
    State(state): State<Arc<AppState<B>>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(request) = payload?;
    let now = state.clock.now();
    let order = request.into_order(state.pricing, now)?;

    tracing::info!(
        order_id = %order.order_id,
        customer = %order.customer_name,
        total = %order.total_amount,
        "creating order"
    );
    state.relay.send_created(&order).await?;
    metrics::counter!("orders_received_total").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order.order_id.to_string(),
            status: order.status,
            total_amount: order.total_amount,
            message: "Order created successfully and sent for processing",
            estimated_delivery: now + Duration::days(5),
        }),
    ))
}

/// GET /api/orders/example: a typical order payload.
pub async fn example() -> Json<Order> {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let address = Address::new(
        "42 Avenue des Champs-Élysées",
        "Paris",
        "Île-de-France",
        "75008",
        "France",
    );
    let mut payment = PaymentInfo::new(domain::DEFAULT_PAYMENT_METHOD);
    payment.card_last_four = Some("1234".into());
    payment.payment_processor = Some("Stripe".into());

    Json(
        Order::builder()
            .customer(
                format!("CUST-{}", &suffix[..8]),
                "Marie Dubois",
                "marie.dubois@example.com",
            )
            .phone_number("+33 6 12 34 56 78")
            .item(
                OrderItem::new("PROD-001", "MacBook Pro 14\"", 1, Money::from_cents(249_999))
                    .with_sku("MBP14-256-SG")
                    .with_category("Electronics")
                    .with_weight(1.6),
            )
            .item(
                OrderItem::new("PROD-002", "Magic Mouse", 1, Money::from_cents(9_999))
                    .with_sku("MM-WHT")
                    .with_category("Accessories")
                    .with_weight(0.1),
            )
            .item(
                OrderItem::new("PROD-003", "USB-C Cable", 2, Money::from_cents(1_999))
                    .with_sku("USBC-2M")
                    .with_category("Accessories")
                    .with_weight(0.05),
            )
            .shipping_address(address.clone())
            .billing_address(address)
            .payment_info(payment)
            .notes("Please deliver during business hours")
            .build(),
    )
}

/// GET /api/orders/example/high-value: an order the payment stage declines.
pub async fn example_high_value() -> Json<Order> {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let address = Address::new("15 Rue de la Paix", "Lyon", "Auvergne-Rhône-Alpes", "69001", "France");
    let mut payment = PaymentInfo::new(domain::DEFAULT_PAYMENT_METHOD);
    payment.card_last_four = Some("9876".into());
    payment.payment_processor = Some("Stripe".into());

    Json(
        Order::builder()
            .customer(
                format!("CUST-VIP-{}", &suffix[..6]),
                "Jean Dupont",
                "jean.dupont@example.com",
            )
            .phone_number("+33 6 98 76 54 32")
            .priority(OrderPriority::Express)
            .item(
                OrderItem::new("PROD-PREMIUM-001", "MacBook Pro 16\" Max", 3, Money::from_cents(399_999))
                    .with_sku("MBP16-1TB-MAX")
                    .with_category("Electronics")
                    .with_weight(2.1),
            )
            .shipping_address(address.clone())
            .billing_address(address)
            .payment_info(payment)
            .build(),
    )
}
