//! dl-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, opens the store,
//! builds the shared state, wires middleware, and starts the HTTP server.
//! All route handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use dl_config::{require_eodhd_token, resolve_vendor_secrets, IngestConfig};
use dl_daemon::{routes, state};
use dl_ingest::IngestDeps;
use dl_md::EodhdProvider;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = IngestConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;

    let pool = dl_db::open_store(&config.db_path()).await?;

    let secrets = resolve_vendor_secrets();
    let token = require_eodhd_token(&secrets)?;
    let provider = Arc::new(EodhdProvider::new(token));

    let deps = IngestDeps {
        pool,
        provider,
        config: config.clone(),
    };
    let shared = Arc::new(state::AppState::new(deps));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = config.bind_addr;
    info!("dl-daemon listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shared))
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Wait for ctrl-c, then ask live workers to stop after their in-flight
/// item. Queue rows they leave behind are reclaimed by stale-running reset
/// on the next resume.
async fn shutdown_signal(state: Arc<state::AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received; cancelling workers");
    state.cancel_all_workers().await;
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
