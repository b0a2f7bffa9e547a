use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use easytrip::config::{LoggingConfig, TripConfig};
use easytrip::gate::RequestGate;
use easytrip::http::HttpServer;
use easytrip::store::Store;

#[derive(Parser)]
#[command(name = "easytrip", version, about = "Group trip planning API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// YAML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Override server.http_addr
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Create a user and print a bearer token for it
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, addr } => {
            let mut config = TripConfig::load(config.as_deref())?;
            if let Some(addr) = addr {
                config.server.http_addr = addr;
            }
            init_tracing(&config.logging);
            serve(config).await
        }
        Command::AddUser { name, email, config } => {
            let config = TripConfig::load(config.as_deref())?;
            init_tracing(&config.logging);
            add_user(&config, &name, &email)
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG takes precedence over the configured level
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

async fn serve(config: TripConfig) -> anyhow::Result<()> {
    info!("Starting Easytrip API");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = Store::from_config(&config.storage)?;
    let gate = RequestGate::from_config(&config, store);
    let policy = gate.limiter().policy();
    info!(
        http_addr = %config.server.http_addr,
        burst = policy.burst,
        refill_per_second = policy.refill_per_second,
        "Configuration loaded"
    );

    let sweeper = gate
        .limiter()
        .spawn_sweeper(config.rate_limiting.sweep_interval());

    let result = HttpServer::new(config.server.http_addr, gate)
        .serve_with_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    result?;

    info!("Easytrip API stopped");
    Ok(())
}

fn add_user(config: &TripConfig, name: &str, email: &str) -> anyhow::Result<()> {
    if config.auth.jwt_secret.is_none() {
        anyhow::bail!("auth.jwt_secret must be configured to issue tokens the server will accept");
    }

    let store = Store::from_config(&config.storage)?;
    let user = store.create_user(name, email)?;
    let token = easytrip::auth::TokenVerifier::from_config(&config.auth).issue(user.id)?;

    info!(user_id = user.id, "User added");
    println!("user_id: {}", user.id);
    println!("token: {}", token);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
