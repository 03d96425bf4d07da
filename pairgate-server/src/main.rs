//! Pairgate: relays pairing approvals to worker services.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use pairgate_core::metrics::RelayMetrics;
use pairgate_core::{ApprovalOrchestrator, RelayConfig};
use pairgate_server::api::{AppState, router};
use pairgate_server::auth::ApiKey;
use pairgate_server::config::ServerConfig;
use pairgate_server::error::StartupError;
use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server_config = ServerConfig::parse();
    let code = match run(server_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ (StartupError::Config(_) | StartupError::Bind { .. })) => {
            error!(error = %e, "Refusing to start");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Pairgate terminated with an error");
            ExitCode::FAILURE
        }
    };

    // Flush buffered log lines before the process exits.
    drop(guard);
    code
}

async fn run(server_config: ServerConfig) -> Result<(), StartupError> {
    let relay_config = RelayConfig::from_env()?;
    info!(config = ?relay_config, "Relay configuration loaded");

    let mut registry = prometheus_client::registry::Registry::default();
    let metrics = Arc::new(RelayMetrics::new(&mut registry));
    let orchestrator = ApprovalOrchestrator::from_config(&relay_config)?.with_metrics(metrics);

    let state = AppState::new(
        Arc::new(orchestrator),
        ApiKey::new(server_config.api_key.clone()),
        server_config.service_name.clone(),
        Arc::new(registry),
    );

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let bind_addr = server_config.bind_string();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    info!(addr = %bind_addr, service = %server_config.service_name, "Pairgate listening");

    let drain_timeout = server_config.shutdown_timeout();
    let graceful = shutdown.clone();
    let server = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
        graceful.cancelled().await;
        info!("Shutdown signal received, draining in-flight requests");
    });

    tokio::select! {
        result = server.into_future() => result.map_err(StartupError::Serve)?,
        () = drain_deadline(shutdown, drain_timeout) => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Drain timeout exceeded, exiting with requests in flight"
            );
        }
    }

    info!("Pairgate stopped");
    Ok(())
}

/// Resolves `timeout` after shutdown begins.
async fn drain_deadline(shutdown: CancellationToken, timeout: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(timeout).await;
}

/// SIGINT and SIGTERM both begin graceful shutdown.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }

    #[cfg(not(unix))]
    let _ = shutdown;
}
