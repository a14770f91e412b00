use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use d_engine_harness::store;
use d_engine_harness::utils::file_io::open_file_for_append;
use d_engine_harness::Error;
use d_engine_harness::NodeConfig;
use d_engine_harness::Result;
use d_engine_harness::CONFIG_PATH_ENV;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // the log file may not exist yet; stderr is collected by the harness
            eprintln!("node failed: {e}");
            error!("node failed: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .map_err(|_| Error::Io(std::io::Error::other(format!("{CONFIG_PATH_ENV} is not set"))))?;
    let config = NodeConfig::load(&path)?;

    // Initializing Logs
    let _guard = init_observability(&config.log_file)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());
    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    info!(name = %config.name, config = %path.display(), "starting store node");
    store::run(config, graceful_rx).await
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    if graceful_tx.send(()).is_err() {
        error!("Failed to send shutdown signal: store already stopped");
    }

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(log_file: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(log_file)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
