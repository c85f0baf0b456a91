//! diagram-pipeline server entry point.

mod api;
mod config;
mod error;
mod middleware;
mod server;

use api::{build_orchestrator, AppState};
use clap::{Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "diagram-pipeline")]
#[command(about = "GraphRAG-backed diagram generation pipeline server", long_about = None)]
struct Args {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML config file, layered over defaults and environment overrides.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration and exit.
    ShowConfig,
    /// Run the HTTP server (default behavior).
    Server {
        /// Bind address, overriding config.
        #[arg(short, long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let mut config = match AppConfig::load(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "failed to load configuration, using defaults");
            AppConfig::default()
        }
    };

    match args.command {
        Some(Command::ShowConfig) => {
            let text = toml::to_string_pretty(&config).unwrap_or_else(|_| "failed to serialize config".to_string());
            println!("{}", text);
            Ok(())
        }
        Some(Command::Server { address }) => {
            if let Some(address) = address {
                config.bind_address = address;
            }
            run_server(config).await
        }
        None => run_server(config).await,
    }
}

async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(bind_address = %config.bind_address, projects_root = %config.projects_root.display(), "starting diagram pipeline server");

    let orchestrator = build_orchestrator(&config).await?;
    let state = AppState::new(config, orchestrator);

    server::serve(state).await?;
    Ok(())
}
