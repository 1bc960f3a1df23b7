//! Tally CLI - versioned, partially encrypted record datasets
//!
//! Thin command-line layer over `tally-core`: dataset files, passphrase
//! prompts, and output formatting live here.

mod cli;
mod commands;
mod config;
mod constants;
mod dataset;
mod errors;
mod output;
mod passphrase;

use clap::Parser;
use tally_core::TallyError;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::constants::LOG_ENV;
use crate::errors::CliError;

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        if let Some(cli_error) = e.downcast_ref::<CliError>() {
            cli_error.exit();
        }
        if let Some(cli_error) = e.downcast_ref::<TallyError>().and_then(CliError::from_core) {
            cli_error.exit();
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr, filtered by `TALLY_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = config::load_config()?;
    match &cli.command {
        Commands::Init(args) => commands::init::handle(args, &config, cli.quiet),
        Commands::Add(args) => commands::add::handle(args, cli.quiet),
        Commands::Show(args) => commands::show::handle(args),
        Commands::Passwd(args) => commands::passwd::handle(args, &config, cli.quiet),
        Commands::Rekey(args) => commands::rekey::handle(args, &config, cli.quiet),
        Commands::Diff(args) => commands::diff::handle(args),
    }
}
