use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::{load_config, GatewayConfig};
use service_gateway::observability::logging;
use service_gateway::{GatewayServer, Shutdown};

/// Resilient API gateway.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file. Without one the gateway
    /// starts with built-in defaults and no upstream services.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("configuration error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);

    let bind = config.listener.bind_address.clone();
    let server = match GatewayServer::new(config) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to build gateway");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, address = %bind, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal.trigger();
        }
    });

    if let Err(err) = server.run(listener, shutdown).await {
        tracing::error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
