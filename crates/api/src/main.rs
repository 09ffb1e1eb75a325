//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use broker::{InMemoryBroker, MessageBroker, PostgresBroker, topic};
use common::SystemClock;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the consumers, the analytics engine and the HTTP server until a signal arrives.
async fn serve<B: MessageBroker + Clone + 'static>(
    broker: B,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let system = api::build_system(broker, &config, Arc::new(SystemClock));

    // Analytics resume from their checkpoint, then catch up before serving
    match system.engine.restore().await {
        Ok(true) => tracing::info!("analytics restored from checkpoint"),
        Ok(false) => tracing::info!("no analytics checkpoint, replaying from the start"),
        Err(e) => tracing::warn!(error = %e, "analytics checkpoint unreadable, replaying"),
    }
    let replayed = system
        .engine
        .run_catch_up()
        .await
        .expect("analytics catch-up failed");
    tracing::info!(records = replayed, "analytics caught up");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Arc::clone(&system.runtime).spawn(shutdown_rx.clone());
    let engine = Arc::clone(&system.engine);
    let schedule = config.engine_schedule();
    handles.push(tokio::spawn(async move {
        if let Err(e) = engine.run(schedule, shutdown_rx).await {
            tracing::error!(error = %e, "analytics engine stopped");
        }
    }));

    let app = api::create_app(Arc::clone(&system.state), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let broker = PostgresBroker::new(pool);
            broker
                .run_migrations()
                .await
                .expect("failed to run migrations");
            for spec in topic::TOPICS {
                broker
                    .ensure_topic(*spec)
                    .await
                    .expect("failed to provision topic");
            }
            tracing::info!("using PostgreSQL broker");
            serve(broker, config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory broker");
            serve(InMemoryBroker::with_topics(topic::TOPICS), config, metrics_handle).await;
        }
    }
}
