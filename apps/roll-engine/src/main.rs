//! Roll Engine Binary
//!
//! Starts the strike-roll reconciliation engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin roll-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DHAN_ACCESS_TOKEN`: Broker API access token
//! - `DHAN_CLIENT_ID`: Broker client id
//!
//! ## Optional
//! - `CONFIG_PATH`: Path to the YAML config file (default: config.yaml)
//! - `RUST_LOG`: Log filter override (default: from config)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roll_engine::broker::dhan::{DhanBrokerAdapter, DhanScripMaster};
use roll_engine::config::{Config, load_config};
use roll_engine::engine::{EngineHandle, Reconciler, RollExecutor};
use roll_engine::ports::StaticPriceSource;
use roll_engine::server::{AppState, create_router};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout for the engine task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = load_config(config_path.as_deref())?;

    init_tracing(&config);

    tracing::info!("Starting roll engine");
    log_config(&config);

    let broker = create_broker(&config)?;
    let resolver = create_resolver(&config)?;
    let prices = Arc::new(StaticPriceSource::new(config.engine.underlying_price));

    let shutdown_token = CancellationToken::new();

    let executor = RollExecutor::new(
        Arc::clone(&broker),
        resolver,
        config.engine.underlying.clone(),
        Duration::from_secs(config.engine.call_timeout_secs),
    );
    let reconciler = Reconciler::new(config.engine.to_settings(), broker, executor, prices);
    let handle = reconciler.handle();

    let engine_handle = tokio::spawn(reconciler.run(shutdown_token.clone()));

    let http_handle = start_http_server(&config, handle, shutdown_token.clone()).await?;

    tracing::info!("Roll engine ready");

    await_shutdown(http_handle, engine_handle, shutdown_token).await;

    tracing::info!("Roll engine stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        underlying = %config.engine.underlying,
        strike_step = %config.engine.strike_step,
        interval_secs = config.engine.interval_secs,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
}

/// Create the Dhan broker adapter (positions and orders).
fn create_broker(config: &Config) -> Result<Arc<DhanBrokerAdapter>, Box<dyn std::error::Error>> {
    let dhan_config = config.broker.dhan.to_adapter_config();
    let broker = DhanBrokerAdapter::new(&dhan_config)?;

    tracing::info!(base_url = %dhan_config.base_url, "DhanBrokerAdapter initialized");

    Ok(Arc::new(broker))
}

/// Create the scrip master instrument resolver.
fn create_resolver(config: &Config) -> Result<Arc<DhanScripMaster>, Box<dyn std::error::Error>> {
    let dhan_config = config.broker.dhan.to_adapter_config();
    let resolver = DhanScripMaster::new(&dhan_config)?;

    tracing::info!(url = %dhan_config.scrip_master_url, "DhanScripMaster initialized");

    Ok(Arc::new(resolver))
}

/// Start the HTTP server with graceful shutdown support.
async fn start_http_server(
    config: &Config,
    handle: EngineHandle,
    shutdown_token: CancellationToken,
) -> Result<JoinHandle<()>, Box<dyn std::error::Error>> {
    let state = AppState {
        handle,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let app = create_router(state);

    let http_addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.http_port).parse()?;

    tracing::info!(%http_addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /v1/positions");
    tracing::info!("  GET  /v1/active-strikes");
    tracing::info!("  GET  /v1/roll-history");
    tracing::info!("  POST /v1/reconcile");

    let listener = TcpListener::bind(http_addr).await?;
    let http_server =
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_token));

    let handle = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            tracing::error!("HTTP server error: {e}");
        }
    });

    Ok(handle)
}

/// Wait for the HTTP server to stop, then drain the engine task.
async fn await_shutdown(
    http_handle: JoinHandle<()>,
    engine_handle: JoinHandle<()>,
    shutdown_token: CancellationToken,
) {
    let _ = http_handle.await;
    tracing::info!("HTTP server stopped");

    shutdown_token.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, engine_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Engine did not stop within the shutdown timeout"
        );
    } else {
        tracing::info!("Reconciliation engine stopped");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; a process that cannot
/// respond to termination signals should fail at startup instead.
#[allow(clippy::expect_used)]
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
