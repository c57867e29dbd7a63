use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use routeguard::config::{LoggingConfig, ServiceConfig};
use routeguard::http::{AppState, HttpServer};
use routeguard::maintenance;
use routeguard::ratelimit::{PolicyTable, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "routeguard")]
#[command(about = "Per-client fixed-window rate limit decision service")]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Route policy file, overriding the configuration
    #[arg(short, long)]
    policies: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.listen {
        config.server.http_addr = addr;
    }
    if let Some(path) = args.policies {
        config.rate_limiting.policies_path = Some(path.display().to_string());
    }

    init_tracing(&config.logging);

    info!("Starting Routeguard Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let policies = match &config.rate_limiting.policies_path {
        Some(path) => PolicyTable::from_file(path)?,
        None => PolicyTable::builtin(),
    };
    info!(routes = policies.len(), "Route policies loaded");

    let rate_limiter = Arc::new(RateLimiter::new());
    let state = AppState::new(Arc::clone(&rate_limiter), policies);

    let sweep_secs = config.rate_limiting.sweep_interval_secs;
    if sweep_secs > 0 {
        tokio::spawn(maintenance::sweep_loop(
            Arc::clone(&rate_limiter),
            Duration::from_secs(sweep_secs),
        ));
    }

    let reload_secs = config.rate_limiting.policy_reload_interval_secs;
    if let (Some(path), true) = (&config.rate_limiting.policies_path, reload_secs > 0) {
        tokio::spawn(maintenance::reload_loop(
            Arc::clone(&state.policies),
            PathBuf::from(path),
            Duration::from_secs(reload_secs),
        ));
    }

    let server = HttpServer::new(config.server.http_addr, state);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Routeguard Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
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
