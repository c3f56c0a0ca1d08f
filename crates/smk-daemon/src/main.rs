//! smk-daemon entry point.
//!
//! Thin on purpose: load config, set up tracing, open the store, build the
//! shared context, wire middleware and serve. Route handlers live in
//! `routes.rs`; startup against the store lives in `bootstrap.rs`.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use smk_config::{DaemonConfig, StoreKind, UnusedKeyPolicy};
use smk_daemon::{bootstrap, push, routes, state::AppContext};
use smk_store::{KeyValueStore, MemoryStore};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "smk-daemon", about = "Smoker coordinator")]
struct Args {
    /// Layered YAML config files, later files override earlier ones.
    #[arg(long = "config", env = "SMOKESTACK_CONFIG", value_delimiter = ',')]
    config: Vec<PathBuf>,

    /// Listen address; overrides `server.addr`.
    #[arg(long, env = "SMOKESTACK_ADDR")]
    addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    let store = open_store(&config).await?;
    let push = push::transport_from_config(&config)?;
    let ctx = AppContext::new(config, store, push);

    bootstrap::start(Arc::clone(&ctx))
        .await
        .context("startup against the store failed")?;

    let addr = match args.addr {
        Some(addr) => addr,
        None => ctx
            .config
            .server
            .addr
            .parse()
            .with_context(|| format!("invalid server.addr '{}'", ctx.config.server.addr))?,
    };

    let app = routes::build_router(Arc::clone(&ctx))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!(
        "{} ({} {}) listening on http://{}",
        ctx.config.server.name, ctx.build.service, ctx.build.version, addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("shut down");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// No files means built-in defaults (in-memory store, logging push).
fn load_config(paths: &[PathBuf]) -> anyhow::Result<DaemonConfig> {
    if paths.is_empty() {
        warn!("no config files given; running on defaults");
        let config = DaemonConfig::default();
        config.validate()?;
        return Ok(config);
    }

    let loaded = smk_config::load_layered_yaml(paths)?;
    let unused = smk_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &unused.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not read by the daemon");
    }
    info!(config_hash = %loaded.config_hash, files = paths.len(), "config loaded");

    DaemonConfig::from_loaded(&loaded)
}

async fn open_store(config: &DaemonConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.store.kind {
        StoreKind::Memory => {
            let store = MemoryStore::new();
            store.spawn_reaper(config.reap_interval());
            info!("using in-memory store");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis")]
        StoreKind::Redis => {
            let url = config
                .store
                .url
                .as_deref()
                .context("store.url is required for the redis store")?;
            let store = smk_store::RedisStore::connect(url).await?;
            info!("using redis store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreKind::Redis => {
            anyhow::bail!("store.kind is redis but smk-daemon was built without the `redis` feature")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
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
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(tower_http::cors::Any)
}
