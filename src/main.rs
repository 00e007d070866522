//! Periscope Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PERISCOPE_HOST: Bind address (default: 0.0.0.0)
//! - PERISCOPE_PORT: Port number (default: 9095)
//! - PERISCOPE_TARGETS: Comma-separated scrape targets (e.g., "10.0.0.2:9100,http://app:8080/metrics")
//! - PERISCOPE_SCRAPE_INTERVAL_SECS: Seconds between scrapes (default: 15)
//! - PERISCOPE_SCRAPE_TIMEOUT_SECS: Per-target scrape timeout (default: 10)
//! - PERISCOPE_MAX_CONCURRENT_SCRAPES: Scrapes in flight at once (default: 4 x CPUs)
//! - PERISCOPE_EVAL_INTERVAL_SECS: Seconds between rule evaluations (default: 15)
//! - PERISCOPE_EVICT_INTERVAL_SECS: Seconds between eviction passes (default: 60)
//! - PERISCOPE_RETENTION_SECS: How long samples are kept (default: 3600)
//! - PERISCOPE_RULES_FILE: Path to a JSON file with alert rules
//! - PERISCOPE_WEBHOOK_URL: Send notifications to this webhook as well as the log
//! - RUST_LOG: Log level (default: info)

use std::time::Duration;

use periscope::alerts::NotifyTarget;
use periscope::api::{run_server, ServerConfig};
use periscope::engine::{load_rules, EngineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "periscope=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("PERISCOPE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PERISCOPE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9095);

    let targets: Vec<String> = std::env::var("PERISCOPE_TARGETS")
        .ok()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut engine = EngineConfig::default().with_targets(targets);
    if let Some(d) = env_secs("PERISCOPE_SCRAPE_INTERVAL_SECS") {
        engine.scrape_interval = d;
    }
    if let Some(d) = env_secs("PERISCOPE_SCRAPE_TIMEOUT_SECS") {
        engine.scrape_timeout = d;
    }
    if let Some(n) = std::env::var("PERISCOPE_MAX_CONCURRENT_SCRAPES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        engine.max_concurrent_scrapes = n;
    }
    if let Some(d) = env_secs("PERISCOPE_EVAL_INTERVAL_SECS") {
        engine.evaluation_interval = d;
    }
    if let Some(d) = env_secs("PERISCOPE_EVICT_INTERVAL_SECS") {
        engine.eviction_interval = d;
    }
    if let Some(d) = env_secs("PERISCOPE_RETENTION_SECS") {
        engine.retention = d;
    }

    if let Ok(path) = std::env::var("PERISCOPE_RULES_FILE") {
        engine = engine.with_rules(load_rules(&path)?);
    }

    if let Ok(url) = std::env::var("PERISCOPE_WEBHOOK_URL") {
        engine.notify.push(NotifyTarget::Webhook {
            url,
            headers: Default::default(),
        });
    }

    let config = ServerConfig {
        host,
        port,
        engine,
    };

    tracing::info!("Periscope configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Targets: {}", config.engine.targets.len());
    for target in &config.engine.targets {
        tracing::info!("    - {}", target);
    }
    tracing::info!(
        "  Scrape interval: {:?} (timeout {:?}, max {} concurrent)",
        config.engine.scrape_interval,
        config.engine.scrape_timeout,
        config.engine.max_concurrent_scrapes
    );
    tracing::info!(
        "  Evaluation interval: {:?}",
        config.engine.evaluation_interval
    );
    tracing::info!(
        "  Retention: {:?} (evicted every {:?})",
        config.engine.retention,
        config.engine.eviction_interval
    );
    tracing::info!("  Rules: {}", config.engine.rules.len());
    tracing::info!("  Notify targets: {}", config.engine.notify.len());

    println!(
        r#"
  ___          _
 | _ \___ _ _ (_)___ __ ___ _ __  ___
 |  _/ -_) '_|| (_-</ _/ _ \ '_ \/ -_)
 |_| \___|_|  |_/__/\__\___/ .__/\___|
                           |_|

 Metrics Scraping and Threshold Alerting
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
