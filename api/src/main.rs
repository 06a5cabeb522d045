//! 9LIVES airdrop claim API.
//!
//! Axum router over the claims-core ledger; structured JSON logs via
//! tracing-subscriber, Prometheus metrics at /metrics, graceful shutdown on
//! SIGINT/SIGTERM.
//!
//! Env vars (reasonable defaults applied):
//!   APP_ADDR                 (default: 0.0.0.0:8080)
//!   APP_SNAPSHOT_DIR         (default: ./data)
//!   APP_REQUEST_TIMEOUT_MS   (default: 5_000)
//!   APP_CONCURRENCY_LIMIT    (default: 1024)
//!   APP_ALLOWED_ORIGINS      (default: *)
//!   APP_DB_URL               (postgres://...; required with the `postgres`
//!                             feature, ignored otherwise)

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use claims_core::{ClaimStore, Snapshots, VestingLedger};

use crate::routes::AppState;

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    snapshot_dir: String,
    request_timeout_ms: u64,
    concurrency_limit: u32,
    allowed_origins: AllowedOrigins,
    db_url: Option<String>,
}

#[derive(Clone, Debug)]
enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

impl Config {
    fn from_env() -> Self {
        let addr = std::env::var("APP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let snapshot_dir =
            std::env::var("APP_SNAPSHOT_DIR").unwrap_or_else(|_| "./data".to_string());
        let request_timeout_ms = std::env::var("APP_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(5_000);
        let concurrency_limit = std::env::var("APP_CONCURRENCY_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1_024);
        let allowed_origins = match std::env::var("APP_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .as_str()
        {
            "*" => AllowedOrigins::Any,
            csv => AllowedOrigins::List(
                csv.split(',')
                    .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
                    .collect(),
            ),
        };
        let db_url = std::env::var("APP_DB_URL").ok();
        Self {
            addr,
            snapshot_dir,
            request_timeout_ms,
            concurrency_limit,
            allowed_origins,
            db_url,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = Config::from_env();
    info!(?cfg, "starting claims API");

    let snapshots = Arc::new(
        Snapshots::load(&cfg.snapshot_dir)
            .with_context(|| format!("load snapshots from {}", cfg.snapshot_dir))?,
    );

    let store = build_store(&cfg).await?;
    serve(cfg, snapshots, store).await
}

#[cfg(feature = "postgres")]
async fn build_store(cfg: &Config) -> anyhow::Result<Arc<claims_core::store::postgres::PgStore>> {
    let dsn = cfg
        .db_url
        .as_deref()
        .context("APP_DB_URL is required (postgres://...)")?;
    let store = claims_core::store::postgres::PgStore::connect(dsn, 32)
        .await
        .context("connect claim store")?;
    store.migrate().await.context("apply claim store schema")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn build_store(_cfg: &Config) -> anyhow::Result<Arc<claims_core::MemoryStore>> {
    tracing::warn!("running with the in-memory store; records do not survive restarts");
    Ok(Arc::new(claims_core::MemoryStore::default()))
}

async fn serve<S: ClaimStore>(
    cfg: Config,
    snapshots: Arc<Snapshots>,
    store: Arc<S>,
) -> anyhow::Result<()> {
    let recorder_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("install metrics recorder")?;
    {
        // Periodic upkeep drains histogram buckets.
        let handle = recorder_handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                handle.run_upkeep();
            }
        });
    }

    let state = AppState {
        ledger: VestingLedger::new(Arc::clone(&snapshots), Arc::clone(&store)),
        snapshots,
        store,
        metrics: Some(recorder_handle),
    };

    let app = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors_layer(&cfg))
            .layer(ConcurrencyLimitLayer::new(cfg.concurrency_limit as usize))
            .layer(TimeoutLayer::new(Duration::from_millis(
                cfg.request_timeout_ms,
            ))),
    );

    let addr: SocketAddr = cfg.addr.parse().context("parse APP_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = ?e, "server error");
    }

    info!("stopped");
    Ok(())
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_level(true)
        .with_target(true)
        .event_format(fmt::format().json());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn"));

    Registry::default().with(env_filter).with(fmt_layer).init();
}

fn cors_layer(cfg: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    match &cfg.allowed_origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(origins) => layer.allow_origin(origins.clone()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => error!(error = ?e, "install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
