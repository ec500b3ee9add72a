//! subsync-daemon entry point.
//!
//! Thin on purpose: tracing, config, store and vendor wiring, middleware,
//! then the HTTP server. Handlers live in `routes.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use subsync_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets_from_env, ConfigConsumer, SyncConfig,
    UnusedKeyPolicy,
};
use subsync_daemon::{routes, state};
use subsync_db::{MemStore, PgStore, SubscriptionStore, ENV_DB_URL};
use subsync_vendor::{HttpVendorGateway, VendorGateway};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_PATHS: &str = "SUBSYNC_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let mut cfg = load_config()?;
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    cfg.validate()?;

    let store = build_store().await?;
    let secrets = resolve_secrets_from_env(&cfg);
    if secrets.vendor_api_key.is_none() {
        warn!(env = %secrets.vendor_api_key_env, "vendor api key not set; calling vendor unauthenticated");
    }
    let vendor: Arc<dyn VendorGateway> = Arc::new(HttpVendorGateway::new(
        cfg.vendor.base_url.clone(),
        Duration::from_millis(cfg.vendor.sync_timeout_ms),
        secrets.vendor_api_key,
    ));

    let shared = Arc::new(state::AppState::from_config(&cfg, store, vendor)?);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cfg
        .daemon
        .addr
        .parse()
        .with_context(|| format!("invalid daemon.addr {:?}", cfg.daemon.addr))?;
    info!(
        store = shared.store_backend,
        vendor_url = %cfg.vendor.base_url,
        isolation = cfg.sync.isolation.as_str(),
        "subsync-daemon listening on http://{}",
        addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
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

/// `SUBSYNC_CONFIG` is a comma-separated list of YAML files, merged in order.
/// Unset means built-in defaults.
fn load_config() -> anyhow::Result<SyncConfig> {
    let Ok(raw) = std::env::var(ENV_CONFIG_PATHS) else {
        info!("{ENV_CONFIG_PATHS} not set; using built-in defaults");
        return Ok(SyncConfig::default());
    };
    let paths: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    let loaded = load_layered_yaml(&paths)?;

    let report = report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key not used by daemon");
    }
    info!(config_hash = %loaded.config_hash, "config loaded");
    loaded.sync_config()
}

/// Postgres when `SUBSYNC_DATABASE_URL` is set, otherwise the in-process store.
async fn build_store() -> anyhow::Result<Arc<dyn SubscriptionStore>> {
    match std::env::var(ENV_DB_URL) {
        Ok(url) if !url.trim().is_empty() => {
            let pool = subsync_db::connect(&url).await?;
            subsync_db::migrate(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        _ => {
            warn!("{ENV_DB_URL} not set; using in-memory store (data is lost on exit)");
            Ok(Arc::new(MemStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
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
