//! Skycache - Versioned Shared Lookup Cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use skycache::cli::{Cli, Commands};
use skycache::config::ConfigManager;
use skycache::error::SkycacheResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SkycacheResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("skycache=warn"),
        1 => EnvFilter::new("skycache=info"),
        _ => EnvFilter::new("skycache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .without_time()
            .init();
    }

    // Dispatch to command
    match cli.command {
        Commands::Get(args) => skycache::cli::commands::get(args, &config).await,
        Commands::Put(args) => skycache::cli::commands::put(args, &config).await,
        Commands::Remove(args) => skycache::cli::commands::remove(args, &config).await,
        Commands::Purge => skycache::cli::commands::purge(&config).await,
        Commands::User(args) => skycache::cli::commands::user(args, &config).await,
        Commands::Config(args) => {
            skycache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
