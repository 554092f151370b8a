//! Refract CLI - composed image retrieval from the command line.
//!
//! Refract ranks a gallery of images against a reference image modified by
//! free text, and evaluates retrieval quality on FashionIQ and CIRR.
//!
//! # Usage
//!
//! ```bash
//! # Top 5 gallery images for a reference + modification
//! refract search dress.png "is red and has sleeves" --dataset fiq --category dress
//!
//! # Validation recall on CIRR
//! refract eval --dataset cirr
//!
//! # Persist the train-split identifier snapshot
//! refract snapshot --dataset fiq --category dress --category shirt
//!
//! # View configuration
//! refract config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use refract_core::Config;

mod cli;
mod logging;

/// Refract - composed image retrieval.
#[derive(Parser, Debug)]
#[command(name = "refract")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "REFRACT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank a gallery against a reference image and a text modification
    Search(cli::search::SearchArgs),

    /// Compute validation recall
    Eval(cli::eval::EvalArgs),

    /// Compute and save the train-split identifier snapshot
    Snapshot(cli::snapshot::SnapshotArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match &cli.config {
        Some(path) => Config::load_from(&expand_path(path))?,
        None => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. \
                     Check your config file with `refract config path`."
                );
                Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Refract v{}", refract_core::VERSION);

    match cli.command {
        Commands::Search(args) => cli::search::execute(config, args).await,
        Commands::Eval(args) => cli::eval::execute(config, args).await,
        Commands::Snapshot(args) => cli::snapshot::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(cli.config.as_deref(), args).await,
    }
}

/// Expand `~` in a user-supplied path.
pub(crate) fn expand_path(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
