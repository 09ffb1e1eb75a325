//! HTTP ingress and process wiring for the order fulfillment system.
//!
//! Accepts orders over REST, publishes them to `order.created` and hosts the
//! fulfillment consumers and the analytics engine in the same process,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use analytics::{AnalyticsEngine, OrderAnalytics, order_analytics_engine};
use axum::Router;
use axum::routing::{get, post};
use broker::MessageBroker;
use common::{Clock, RandomSource, SeededRandom};
use domain::PricingPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    ConsumerRuntime, LatencyProfile, OrderRelay, ProbabilisticAvailability,
    SimulatedChannel, SimulatedPaymentGateway, StageDependencies, fulfillment_registry,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: MessageBroker + 'static>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<B>))
        .route("/api/orders", post(routes::orders::create::<B>))
        .route("/api/orders/example", get(routes::orders::example))
        .route(
            "/api/orders/example/high-value",
            get(routes::orders::example_high_value),
        )
        .route("/api/analytics/summary", get(routes::analytics::summary::<B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The components of a running node, all sharing one broker.
pub struct System<B> {
    pub state: Arc<AppState<B>>,
    pub runtime: Arc<ConsumerRuntime<B>>,
    pub engine: Arc<AnalyticsEngine<B>>,
    pub analytics: OrderAnalytics,
}

/// Wires the relay, the fulfillment stages and the analytics engine.
///
/// The simulated collaborators draw from one random source, seeded from
/// `config.random_seed` when present.
pub fn build_system<B: MessageBroker + Clone + 'static>(
    broker: B,
    config: &Config,
    clock: Arc<dyn Clock>,
) -> System<B> {
    let random: Arc<dyn RandomSource> = match config.random_seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(SeededRandom::from_entropy()),
    };

    let (inventory_latency, payment_latency, notification_latency) = if config.simulated_latency {
        (
            LatencyProfile::INVENTORY,
            LatencyProfile::PAYMENT,
            LatencyProfile::NOTIFICATION,
        )
    } else {
        (LatencyProfile::none(), LatencyProfile::none(), LatencyProfile::none())
    };

    let settings = config.fulfillment_settings();
    let deps = StageDependencies {
        broker: broker.clone(),
        clock: Arc::clone(&clock),
        random: Arc::clone(&random),
        inventory: Arc::new(
            ProbabilisticAvailability::new(Arc::clone(&random), Arc::clone(&clock))
                .with_latency(inventory_latency),
        ),
        payments: Arc::new(
            SimulatedPaymentGateway::new(Arc::clone(&random), Arc::clone(&clock))
                .with_latency(payment_latency),
        ),
        channel: Arc::new(
            SimulatedChannel::new(Arc::clone(&random), Arc::clone(&clock))
                .with_latency(notification_latency),
        ),
        settings: settings.clone(),
    };

    let registry = fulfillment_registry(&deps);
    let subscriptions = registry.len();
    let runtime = ConsumerRuntime::new(
        broker.clone(),
        registry,
        Arc::clone(&clock),
        random,
        settings,
    );

    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::clone(&clock), &analytics);

    let state = Arc::new(AppState {
        relay: OrderRelay::new(broker),
        analytics: analytics.clone(),
        clock,
        pricing: PricingPolicy::default(),
        subscriptions,
    });

    System {
        state,
        runtime: Arc::new(runtime),
        engine: Arc::new(engine),
        analytics,
    }
}
