//! breachflow command-line interface.
//!
//! ```bash
//! # Run the HTTP API on the configured address
//! breachflow serve
//!
//! # Show the configuration after all layers are merged
//! breachflow config
//!
//! # When are notices due for a critical breach detected now?
//! breachflow deadlines --severity critical
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use breachflow_config::{BreachflowConfig, ConfigLoader, LogFormat, LoggingConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Breach-notification workflow for DPDP compliance.
#[derive(Parser)]
#[command(name = "breachflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file layered above breachflow.toml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve {
        /// Address to bind to, overriding `server.bind_address`.
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the resolved configuration.
    Config {
        /// Output format: toml or json.
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// List the built-in notification templates.
    Templates,

    /// Compute the notification deadlines for an incident.
    Deadlines {
        /// Incident severity (low, medium, high, critical).
        #[arg(short, long)]
        severity: Option<String>,

        /// Detection time as RFC 3339. Defaults to now.
        #[arg(short, long)]
        detected_at: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    init_logging(cli.verbose, &config.logging);

    run(cli.command, &config)
}

fn run(command: Commands, config: &BreachflowConfig) -> Result<()> {
    match command {
        Commands::Serve { bind } => commands::serve::run(config, bind.as_deref()),
        Commands::Config { format } => commands::config::show(config, &format),
        Commands::Templates => commands::templates::list(),
        Commands::Deadlines {
            severity,
            detected_at,
        } => commands::deadlines::run(severity.as_deref(), detected_at.as_deref()),
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` or `logging.level`.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
