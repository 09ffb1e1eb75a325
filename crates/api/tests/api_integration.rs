//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::System;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use broker::{BrokerExt, InMemoryBroker, topic};
use common::ManualClock;
use domain::{Order, OrderEvent, OrderStatus, event_types};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::order_fulfillment::{HEADER_CUSTOMER_ID, HEADER_EVENT_TYPE, HEADER_PRIORITY};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> Config {
    Config {
        random_seed: Some(7),
        simulated_latency: false,
        ..Config::default()
    }
}

fn setup() -> (axum::Router, InMemoryBroker, System<InMemoryBroker>) {
    let broker = InMemoryBroker::new();
    let system = api::build_system(broker.clone(), &test_config(), Arc::new(ManualClock::default()));
    let app = api::create_app(Arc::clone(&system.state), get_metrics_handle());
    (app, broker, system)
}

fn order_body() -> serde_json::Value {
    serde_json::json!({
        "customerId": "CUST-100",
        "customerName": "Grace Hopper",
        "customerEmail": "grace@example.com",
        "items": [
            {"productId": "PROD-1", "productName": "Keyboard", "quantity": 2, "unitPrice": "49.99"},
            {"productId": "PROD-2", "productName": "Monitor", "quantity": 1, "unitPrice": "1299.00"}
        ],
        "shippingAddress": {
            "street": "1 Navy Way",
            "city": "Arlington",
            "state": "VA",
            "postalCode": "22202",
            "country": "USA"
        },
        "paymentInfo": {"paymentMethod": "CREDIT_CARD"}
    })
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, system) = setup();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["subscriptions"], system.runtime.registry().len());
}

#[tokio::test]
async fn test_create_order_publishes_to_created_topic() {
    let (app, broker, _) = setup();

    let response = app
        .oneshot(post_json("/api/orders", order_body().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "PENDING");
    assert_eq!(
        json["message"],
        "Order created successfully and sent for processing"
    );
    let order_id = json["orderId"].as_str().unwrap().to_string();

    let records = broker.read_topic(topic::ORDER_CREATED).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.key.as_deref(), Some(order_id.as_str()));
    assert_eq!(record.header(HEADER_EVENT_TYPE), Some("ORDER_CREATED"));
    assert_eq!(record.header(HEADER_PRIORITY), Some("NORMAL"));
    assert_eq!(record.header(HEADER_CUSTOMER_ID), Some("CUST-100"));

    let order: Order = record.decode().unwrap();
    assert_eq!(order.order_id.as_str(), order_id);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal, order.items_total().unwrap());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, broker, _) = setup();

    let response = app
        .oneshot(post_json("/api/orders", "{not json".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
    assert_eq!(broker.record_count(topic::ORDER_CREATED).await, 0);
}

#[tokio::test]
async fn test_invalid_item_data_is_unprocessable() {
    let (app, _, _) = setup();

    let body = serde_json::json!({
        "customerName": "Grace Hopper",
        "items": [{"productId": "PROD-1", "quantity": "many", "unitPrice": "1.00"}]
    });
    let response = app
        .oneshot(post_json("/api/orders", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_overflowing_amount_is_unprocessable() {
    let (app, broker, _) = setup();

    let mut body = order_body();
    body["items"][0]["unitPrice"] = serde_json::json!("90000000000000000.00");
    let response = app
        .oneshot(post_json("/api/orders", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("overflows"));
    assert_eq!(broker.record_count(topic::ORDER_CREATED).await, 0);
}

#[tokio::test]
async fn test_broker_failure_is_service_unavailable() {
    let (app, broker, _) = setup();
    broker.set_fail_on_publish(topic::ORDER_CREATED, true);

    let response = app
        .oneshot(post_json("/api/orders", order_body().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(broker.record_count(topic::ORDER_CREATED).await, 0);
}

#[tokio::test]
async fn test_example_orders() {
    let (app, _, _) = setup();

    let response = app.clone().oneshot(get("/api/orders/example")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["customerName"], "Marie Dubois");
    assert_eq!(json["items"].as_array().unwrap().len(), 3);

    let response = app
        .oneshot(get("/api/orders/example/high-value"))
        .await
        .unwrap();
    let order: Order = serde_json::from_value(json_body(response).await).unwrap();
    assert!(order.total_amount > domain::Money::from_dollars(10_000));
}

#[tokio::test]
async fn test_submitted_order_enters_the_workflow() {
    let (app, broker, system) = setup();

    let response = app
        .oneshot(post_json("/api/orders", order_body().to_string()))
        .await
        .unwrap();
    let order_id = json_body(response).await["orderId"]
        .as_str()
        .unwrap()
        .to_string();

    system.runtime.drain().await.unwrap();

    let events: Vec<OrderEvent> = broker
        .read_topic(topic::ORDER_EVENTS)
        .await
        .unwrap()
        .iter()
        .map(|r| r.decode().unwrap())
        .filter(|e: &OrderEvent| e.order_id.as_str() == order_id)
        .collect();
    assert!(events.iter().any(|e| e.event_type == event_types::ORDER_CONFIRMED));
    assert!(events.iter().any(|e| e.event_type == event_types::ORDER_VALIDATED));
}

#[tokio::test]
async fn test_analytics_summary_reflects_created_orders() {
    let (app, _, system) = setup();

    let response = app
        .clone()
        .oneshot(post_json("/api/orders", order_body().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    system.engine.run_catch_up().await.unwrap();

    let response = app.oneshot(get("/api/analytics/summary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["highValueOrders"].as_array().unwrap().len(), 1);
    assert!(json["loyalCustomers"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = setup();

    let response = app
        .clone()
        .oneshot(post_json("/api/orders", order_body().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_received_total"));
}
