//! Search sync service entry point.

use std::env;
use std::process::ExitCode;

use dotenv::dotenv;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use search_sync::{AppConfig, Dependencies, IndexingError};
use search_sync_pipeline::{orchestrator::ShutdownHandle, PipelineError};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(config.as_ref().map(|c| c.debug).unwrap_or(false));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Search sync stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Search sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), IndexingError> {
    let dependencies = Dependencies::new(&config).await?;
    let orchestrator = dependencies.orchestrator;

    tokio::spawn(shutdown_on_signal(orchestrator.shutdown_handle()));

    info!("Search sync started");

    match orchestrator.run().await {
        Ok(()) | Err(PipelineError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when `DEBUG` is set.
/// `LOG_FORMAT=json` switches to structured JSON lines.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Listen for SIGTERM and SIGINT, then cancel the batch loop.
async fn shutdown_on_signal(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }

    handle.shutdown();
}
