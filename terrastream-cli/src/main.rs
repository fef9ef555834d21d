//! TerraStream CLI.
//!
//! Command-line driver for the streaming scheduler library: simulate
//! observer flights over synthetic worlds and inspect deployment
//! profiles.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "terrastream", version, about = "Distance-tiered terrain streaming scheduler")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Simulate an observer flight over a synthetic world
    Simulate(commands::simulate::SimulateArgs),
    /// Load and display a streaming profile
    Profile(commands::profile::ProfileArgs),
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<(), CliError> = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Profile(args) => commands::profile::run(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
