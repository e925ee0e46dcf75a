//! `deskpilot` - model-driven control of a remote sandboxed desktop
//!
//! This binary hosts the WebSocket server clients connect to. Each chat
//! request becomes one orchestrated interaction: the model sees the
//! desktop through tool results and acts on it through tool calls.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::config::Config;

mod config;
mod server;

/// Model-driven control of a remote sandboxed desktop
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print version information
    #[arg(long)]
    pub version: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the WebSocket server (the default when no command is given)
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!(
            "deskpilot v{} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
        }
        None => {}
    }

    let level = config.log.level.parse().unwrap_or_else(|_| {
        eprintln!("unrecognized log level {:?}, using info", config.log.level);
        LevelFilter::Info
    });
    deskpilot_core::logger::init(level, config.log.file.clone(), true)?;
    log::info!(
        "deskpilot v{} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    server::run(config).await
}
