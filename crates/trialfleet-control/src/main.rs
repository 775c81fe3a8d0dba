//! Trialfleet control daemon.
//!
//! Runs the reconciliation loop against a `RocksDB` store and the
//! provisioning broker, and serves health probes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trialfleet_cloud::{HttpCloudGateway, ProviderRegistry};
use trialfleet_control::{ControlConfig, Reconciler};
use trialfleet_store::RocksStore;

type Engine = Reconciler<RocksStore, HttpCloudGateway>;

/// Trial resource reconciliation daemon.
#[derive(Debug, Parser)]
#[command(name = "trialfleet-control", version, about)]
struct Args {
    /// Directory holding the `RocksDB` database.
    #[arg(long, env = "TRIALFLEET_DATA_DIR", default_value = "/data")]
    data_dir: PathBuf,

    /// Address to serve health probes on.
    #[arg(long, env = "TRIALFLEET_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,

    /// Base URL of the provisioning broker.
    #[arg(long, env = "TRIALFLEET_BROKER_URL", default_value = "http://localhost:9090")]
    broker_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "trialfleet-control",
    })
}

async fn ready_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    if engine.last_tick().is_some() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for first tick")
    }
}

fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(engine)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trialfleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting Trialfleet Control");

    let config = ControlConfig::from_env();
    tracing::info!(?config, "Loaded configuration");

    let store = Arc::new(RocksStore::open(&args.data_dir)?);
    tracing::info!(data_dir = %args.data_dir.display(), "Initialized RocksDB store");

    let gateway = Arc::new(HttpCloudGateway::new(&args.broker_url)?);
    tracing::info!(broker_url = %args.broker_url, "Initialized provisioning gateway");

    let engine = Arc::new(Reconciler::new(
        store,
        gateway,
        ProviderRegistry::builtin()?,
        config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    let app = create_router(engine);
    tracing::info!(listen_addr = %args.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(args.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received; finishing current tick");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    worker.await?;
    tracing::info!("Trialfleet Control stopped");
    Ok(())
}
