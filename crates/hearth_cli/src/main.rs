//! Hearth CLI
//!
//! Runs the sync server and inspects its data.
//!
//! # Commands
//!
//! - `serve` - Run the sync server with the optional MQTT bridge
//! - `inspect` - List the objects in a journal file
//! - `check-config` - Validate a configuration file and print the result

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Thermostat object synchronization server.
#[derive(Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server until interrupted
    Serve {
        /// Journal file, overriding `storage.path`
        #[arg(short, long)]
        storage: Option<PathBuf>,

        /// Do not start the MQTT bridge even if configured
        #[arg(long)]
        no_mqtt: bool,
    },

    /// List the objects in a journal file
    Inspect {
        /// Journal file, defaulting to `storage.path`
        path: Option<PathBuf>,

        /// Only show keys of this object type
        #[arg(short = 't', long)]
        object_type: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate the configuration file and print the resolved settings
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over the flag.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => config::HearthConfig::load(path)?,
        None => config::HearthConfig::default(),
    };

    match cli.command {
        Commands::Serve { storage, no_mqtt } => {
            commands::serve::run(config, storage, no_mqtt).await?;
        }
        Commands::Inspect {
            path,
            object_type,
            format,
        } => {
            let path = path
                .or_else(|| config.storage.path.clone())
                .ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, object_type.as_deref(), &format)?;
        }
        Commands::CheckConfig => {
            commands::check_config::run(&config)?;
        }
        Commands::Version => {
            println!("hearth v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
