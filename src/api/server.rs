use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_alert, health_check, list_alerts, list_firing, list_rules, list_series, query, stats,
    AppState,
};
use crate::alerts::{NotificationSink, Notifier};
use crate::engine::scheduler::Intervals;
use crate::engine::{Engine, EngineConfig, Scheduler};
use crate::scrape::{HttpSource, Scraper};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9095,
            engine: EngineConfig::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Engine state
        .route("/stats", get(stats))
        .route("/alerts", get(list_alerts))
        .route("/alerts/firing", get(list_firing))
        .route("/alerts/:name", get(get_alert))
        .route("/rules", get(list_rules))
        // Series
        .route("/series", get(list_series))
        .route("/query", post(query))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the engine and its HTTP API until Ctrl-C
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.engine.validate()?;

    let engine = Arc::new(Engine::from_config(&config.engine));

    let source = HttpSource::new(config.engine.scrape_timeout)?;
    let scraper = Arc::new(Scraper::new(
        Arc::new(source),
        config.engine.targets.clone(),
        config.engine.scrape_timeout,
        config.engine.max_concurrent_scrapes,
    ));
    let sink: Arc<dyn NotificationSink> = Arc::new(Notifier::new(config.engine.notify.clone()));

    let mut scheduler = Scheduler::new(
        Arc::clone(&engine),
        scraper,
        sink,
        Intervals::from(&config.engine),
    );
    let scheduler_handle = scheduler.start();

    let state = Arc::new(AppState {
        engine,
        targets: config.engine.targets.clone(),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Periscope API on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, stopping scheduler...");
    scheduler.stop().await;
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }

    tracing::info!("Periscope stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
