//! RelayChat - local browser front end for an assistant CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use relaychat::{agent::launcher::resolve_cli_binary, config::RelayConfig, gateway::Gateway};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relaychat")]
#[command(version)]
#[command(about = "Chat with an assistant CLI from the browser")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RELAYCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Working directory for CLI sessions
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Check that the assistant CLI can be found
    Doctor,
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("relaychat={},tower_http=debug", log_level).into());
    if cli.json_logs {
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

    let config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            project,
        } => {
            run_server(config, host, port, project).await?;
        }
        Commands::Doctor => {
            run_doctor(&config);
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_server(
    mut config: RelayConfig,
    host: Option<String>,
    port: Option<u16>,
    project: Option<PathBuf>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if project.is_some() {
        config.project_dir = project;
    }

    match resolve_cli_binary(&config.cli) {
        Ok(path) => tracing::info!("Using assistant CLI at {}", path.display()),
        Err(e) => tracing::warn!("{}. Sessions will fail until it is installed", e),
    }

    let gateway = Gateway::new(config);
    gateway
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;
    Ok(())
}

fn run_doctor(config: &RelayConfig) {
    println!("RelayChat Doctor");
    println!();

    println!("Checking assistant CLI...");
    match resolve_cli_binary(&config.cli) {
        Ok(path) => println!("  ✓ Found {}", path.display()),
        Err(e) => println!("  ✗ {}", e),
    }

    println!();
    println!("Checking project directory...");
    let project = config.project_dir();
    if project.is_dir() {
        println!("  ✓ {}", project.display());
    } else {
        println!("  ✗ {} is not a directory", project.display());
    }

    println!();
    println!("Doctor check complete!");
}

fn show_config(config: Option<&RelayConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
