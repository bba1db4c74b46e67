mod config;
mod logging;
mod statsd;

use clap::Parser;
use config::{Config, ConfigError};
use coordinator::Coordinator;
use coordinator::store::StoreError;
use relay_router::archive::TracingArchive;
use relay_router::errors::RouterError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(about = "Routes webhook traffic to relays and keeps relay assignments healthy")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, default_value = "conductor.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] logging::LoggingError),
    #[error(transparent)]
    Metrics(#[from] statsd::MetricsError),
    #[error("could not connect to store: {0}")]
    Store(#[from] StoreError),
    #[error("router failed: {0}")]
    Router(#[from] RouterError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is not up yet, so config errors go straight to stderr.
    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("conductor: {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    match start(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "conductor exited with error");
            eprintln!("conductor: {e}");
            ExitCode::FAILURE
        }
    }
}

fn start(config: Config) -> Result<(), CliError> {
    let _sentry = logging::init(&config.common.logging)?;

    if let Some(metrics) = &config.common.metrics {
        statsd::init(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), CliError> {
    tracing::info!(
        base_domain = %config.router.base_domain,
        "starting conductor"
    );

    let store = coordinator::get_store(&config.coordinator.store).await?;
    let coordinator = Coordinator::new(store, &config.coordinator);

    let cancel = CancellationToken::new();
    let sweeper = coordinator.start_cleanup_routine(cancel.clone());
    tokio::spawn(shutdown_signal(cancel.clone()));

    let result = relay_router::run(
        config.router,
        coordinator,
        Arc::new(TracingArchive),
        cancel.clone(),
    )
    .await;

    // Listeners may also stop on error; the sweeper goes down with them.
    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "cleanup routine panicked");
    }

    result?;
    tracing::info!("conductor shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
        () = cancel.cancelled() => {}
    }

    cancel.cancel();
}
