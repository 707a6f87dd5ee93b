//! Stream Mocker CLI - chat-completion API test double
//!
//! Usage:
//!   stream-mocker serve [OPTIONS]    Start the HTTP server
//!
//! Examples:
//!   stream-mocker serve --port 8000
//!   stream-mocker serve --config config.toml
//!   STREAM_MOCKER_JSON_LOGS=true stream-mocker serve

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stream_mocker::cli::Config;
use stream_mocker::errors::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "stream_mocker=info,tower_http=info";

#[derive(Parser)]
#[command(name = "stream-mocker")]
#[command(author, version, about = "Chat-completion API test double with rate-paced streaming", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file (YAML, or TOML when the name ends in .toml)
        #[arg(short, long, env = "STREAM_MOCKER_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on; overrides the file
        #[arg(short, long, env = "STREAM_MOCKER_PORT")]
        port: Option<u16>,

        /// Host to bind to; overrides the file
        #[arg(long, env = "STREAM_MOCKER_HOST")]
        host: Option<String>,

        /// Emit logs as JSON
        #[arg(long, env = "STREAM_MOCKER_JSON_LOGS")]
        json_logs: bool,
    },
}

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_config(
    config_file: Option<&PathBuf>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<Config, ConfigError> {
    let mut config = match config_file {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };

    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            json_logs,
        } => {
            init_tracing(json_logs);
            let settings = build_config(config.as_ref(), port, host)?;
            stream_mocker::cli::run_server(settings, config).await?;
        }
    }

    Ok(())
}
