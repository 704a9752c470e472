#![doc = include_str!("../README.md")]

mod host;

use clap::Parser;
use host::config::{CliArgs, HostConfig};
use host::telemetry::init_telemetry;
use roboid::{BridgeHost, IdenticonEngine, LocalClient};
use tokio::io::BufReader;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = HostConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let client = LocalClient::spawn(IdenticonEngine::new(), config.pool.clone());
    #[cfg(feature = "tracing")]
    tokio::spawn(log_events(client.events().subscribe()));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let res = host::stdio::serve(
        BridgeHost::new(client),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.log_requests,
        shutdown,
    )
    .await;

    #[cfg(feature = "tracing")]
    match &res {
        Ok(()) => tracing::info!("Host shut down successfully"),
        Err(e) => tracing::error!("Host stopped with error: {e:#}"),
    }

    providers.shutdown();
    res
}

fn log_startup_info(_config: &HostConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting roboid host with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting roboid host with {} workers",
            _config.pool.pool_size
        );
    }
}

#[cfg(feature = "tracing")]
async fn log_events(mut events: tokio::sync::broadcast::Receiver<roboid::Event>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(roboid::Event::EngineReady) => tracing::info!("Engine ready"),
            Ok(roboid::Event::ReadinessFailed { reason }) => {
                tracing::error!("Engine not ready: {reason}");
            }
            Ok(roboid::Event::TransportFailure { reason }) => {
                tracing::warn!("Transport failure: {reason}");
            }
            Err(RecvError::Lagged(skipped)) => tracing::warn!("Skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");
    token.cancel();
}
