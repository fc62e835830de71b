use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatroom_relay::RelayServer;

mod config;

use config::{ChatroomConfig, ConfigSource};

#[derive(Parser)]
#[command(name = "chatroom")]
#[command(version)]
#[command(about = "Chatroom — a room-based WebSocket chat relay")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server until Ctrl+C
    Start {
        /// Override the configured listen address
        #[arg(long)]
        bind: Option<String>,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write the default config file
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = ChatroomConfig::load(&cli.config);

    // Set up logging: --debug wins, then RUST_LOG, then the config file
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        let level = cfg
            .as_ref()
            .map(|(c, _)| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(loaded(cfg)?),
        Commands::Start { bind, port } => cmd_start(loaded(cfg)?, bind, port).await,
    }
}

/// Unwrap the loaded config and report where it came from; runs after the subscriber is installed
fn loaded(cfg: Result<(ChatroomConfig, ConfigSource)>) -> Result<ChatroomConfig> {
    let (cfg, source) = cfg?;
    info!("{}", source.describe());
    Ok(cfg)
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Chatroom initialized at {}", config_dir.display());
    Ok(())
}

fn cmd_config(cfg: ChatroomConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_start(mut cfg: ChatroomConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        cfg.server.bind = bind;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }
    let addr = cfg.server.socket_addr()?;
    info!("Starting chatroom relay...");

    let cancel = CancellationToken::new();
    let mut server = RelayServer::new(addr, cancel.clone()).spawn();

    println!("Chatroom relay is running on ws://{}/ws. Press Ctrl+C to stop.", addr);

    // Wait for shutdown signal, or for the server to stop on its own (e.g. bind failure)
    let finished = tokio::select! {
        signal = signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            None
        }
        finished = &mut server => Some(finished),
    };
    let result = match finished {
        Some(result) => result,
        None => server.await,
    };
    result.context("Relay server task panicked")??;

    println!("Chatroom stopped.");
    Ok(())
}
