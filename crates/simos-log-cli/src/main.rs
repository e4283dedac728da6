//! simoslog - offline driver for the UDS logging engine
//!
//! Prints the setup frames a definition file produces and replays recorded
//! bridge captures into CSV log sessions.

mod capture;
mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simos_log::{EngineConfig, LoggingMode, ParameterTable};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "simoslog")]
#[command(author, version, about = "ECU live-data logging over a BLE-to-ISOTP bridge")]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "SIMOSLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Parameter definition file (YAML with mode_22 / mode_3e lists)
    #[arg(short, long, env = "SIMOSLOG_DEFINITIONS")]
    definitions: PathBuf,

    /// Logging mode: 22 or 3E
    #[arg(short, long, default_value = "22", value_parser = parse_mode)]
    mode: LoggingMode,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every setup frame and the discovered torque source
    Plan,

    /// Feed a recorded capture through the engine
    Replay {
        /// Capture file: one `<tick> <hex frame>` or `<tick> -` per line
        capture: PathBuf,

        /// Directory receiving CSV log sessions
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

fn parse_mode(s: &str) -> Result<LoggingMode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("simoslog=debug,simos_log=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("simoslog=info,simos_log=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let table = ParameterTable::from_file(&cli.definitions).with_context(|| {
        format!(
            "Failed to load parameter definitions: {}",
            cli.definitions.display()
        )
    })?;

    match &cli.command {
        Commands::Plan => commands::plan(config, table, cli.mode)?,
        Commands::Replay { capture, out } => {
            commands::replay(config, table, cli.mode, capture, out).await?
        }
    }

    Ok(())
}
