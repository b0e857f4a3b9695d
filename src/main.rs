// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::clock::SystemClock;
use crate::application::ingestion_service::IngestionService;
use crate::application::price_scheduler::PriceScheduler;
use crate::application::price_service::{PriceBoards, PriceService};
use crate::domain::gauge::GaugeGeometry;
use crate::infrastructure::config::load_dashboard_config;
use crate::infrastructure::mqtt_feed::MqttFeed;
use crate::infrastructure::price_client::HttpPriceSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    gauges, health_check, prices_today, prices_tomorrow, status, telemetry, telemetry_stream,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = load_dashboard_config().context("Failed to load configuration")?;

    // Infrastructure adapters
    let feed = Arc::new(MqttFeed::new(config.mqtt.clone()));
    let price_source = Arc::new(HttpPriceSource::new(
        &config.prices.base_url,
        &config.prices.region,
        config.prices.timeout(),
    )?);
    let clock = Arc::new(SystemClock);

    // Services (application layer)
    let ingestion = IngestionService::new(
        feed,
        config.mqtt.topics.feed_topics(),
        config.mqtt.reconnect_delay(),
    );
    let retry_after = config.prices.retry_after()?;
    let today = PriceService::new(PriceScheduler::today(retry_after), price_source.clone(), clock.clone());
    let tomorrow = PriceService::new(
        PriceScheduler::tomorrow(config.prices.publish_time()?, retry_after),
        price_source,
        clock,
    );

    let state = Arc::new(AppState {
        telemetry: ingestion.subscribe(),
        link: ingestion.subscribe_link(),
        prices: PriceBoards {
            today: today.subscribe(),
            tomorrow: tomorrow.subscribe(),
        },
        geometry: GaugeGeometry::default(),
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    let tasks = [
        tokio::spawn(ingestion.run(stop_rx.clone())),
        tokio::spawn(today.run(stop_rx.clone())),
        tokio::spawn(tomorrow.run(stop_rx)),
    ];

    // Router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(status))
        .route("/telemetry", get(telemetry))
        .route("/telemetry/stream", get(telemetry_stream))
        .route("/gauges", get(gauges))
        .route("/prices/today", get(prices_today))
        .route("/prices/tomorrow", get(prices_tomorrow))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting energy-dashboard on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background services");
    // receivers may already be gone if every task exited early
    let _ = stop_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task failed: {}", e);
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("energy_dashboard=info,tower_http=info")),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
