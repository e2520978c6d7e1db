use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, LoggingConfig, TollgateConfig};
use tollgate::grpc::GrpcServer;
use tollgate::ratelimit::{spawn_idle_sweeper, KeyedLimiterStore};

/// Per-key token bucket admission control service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// gRPC listen address
    #[arg(long)]
    grpc_addr: Option<std::net::SocketAddr>,

    /// Requests allowed per window, also the burst size
    #[arg(long)]
    requests: Option<u32>,

    /// Window length in seconds
    #[arg(long)]
    per_seconds: Option<f64>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    if let Some(requests) = args.requests {
        config.limiter.requests = requests;
    }
    if let Some(per_seconds) = args.per_seconds {
        config.limiter.per_seconds = per_seconds;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter_config = config.limiter.limiter_config()?;
    let store = Arc::new(KeyedLimiterStore::new(limiter_config));
    info!(
        capacity = limiter_config.capacity(),
        refill_rate = limiter_config.refill_rate(),
        "Rate limiter initialized"
    );

    let sweeper = config.eviction.enabled.then(|| {
        spawn_idle_sweeper(
            store.clone(),
            config.eviction.idle_ttl(),
            config.eviction.sweep_interval(),
        )
    });

    let grpc_server = GrpcServer::new(config.server.grpc_addr, store)
        .with_anonymous_key(config.limiter.anonymous_key.clone());

    info!("Starting gRPC server on {}", config.server.grpc_addr);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Tollgate Admission Control Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
