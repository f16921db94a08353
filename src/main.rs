//! Cakerank - bakery storefront popularity service
//!
//! Serves a ranked "most popular cakes" view computed from order volume,
//! ratings and comment engagement:
//! - Time-bounded snapshot cache with single-flight recomputation
//! - Eager invalidation from the order and comment write paths
//! - Prometheus metrics

mod api;
mod config;
mod error;
mod metrics;
mod model;
mod popularity;
mod services;

use crate::api::AppState;
use crate::config::Config;
use crate::metrics::create_metrics;
use crate::popularity::{Aggregator, PopularityCache, SystemClock};
use crate::services::store::MongoStore;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Cakerank - popular cakes API
#[derive(Parser, Debug)]
#[command(name = "cakerank")]
#[command(author, version, about = "Bakery popularity ranking server", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging for record-store queries
    #[arg(long)]
    debug_queries: bool,

    /// Server port (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before parsing args, so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs, args.debug_queries)?;

    info!("Starting Cakerank v{}", env!("CARGO_PKG_VERSION"));

    // Load config (CLI port overrides env var)
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.debug_queries = args.debug_queries;

    if config.debug_queries {
        info!("Record-store query debugging enabled");
    }

    let metrics = create_metrics();

    let store = Arc::new(MongoStore::connect(&config).await?);

    let cache_config = config.to_cache_config();
    info!(
        ttl_secs = cache_config.ttl.as_secs(),
        recompute_timeout_ms = cache_config.recompute_timeout.map(|t| t.as_millis() as u64),
        "Popularity cache configured"
    );

    let cache = PopularityCache::new(
        Aggregator::new(store.clone()),
        cache_config,
        Arc::new(SystemClock),
        metrics.clone(),
    );

    let state = AppState {
        cache: Arc::new(cache),
        writer: store,
        metrics,
    };

    let app = api::router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(
        "Listening on http://{} (Popular: /popular, Metrics: /metrics, Health: /health)",
        addr
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        info!("Shutdown signal received, initiating graceful shutdown...");
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Cakerank shutdown complete");
    Ok(())
}

fn init_logging(level: &str, json: bool, debug_queries: bool) -> anyhow::Result<()> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);

    // Build filter: set cakerank to requested level, and optionally enable query debugging
    let filter = if debug_queries {
        EnvFilter::new(format!(
            "cakerank={},cakerank::services::store=debug,tower_http=debug,hyper=warn",
            level
        ))
    } else {
        EnvFilter::new(format!("cakerank={},tower_http=info,hyper=warn", level))
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    Ok(())
}
