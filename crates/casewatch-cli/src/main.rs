//! casewatch CLI
//!
//! Command-line interface for dossier snapshot reconciliation

use casewatch_core::logging_facility::{init, Profile};
use casewatch_engine::config::DEFAULT_DB_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "casewatch")]
#[command(about = "casewatch - Dossier snapshot reconciliation", long_about = None)]
struct Cli {
    /// SQLite store holding the canonical snapshot, runs and change log
    #[arg(long, global = true, env = "CASEWATCH_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// TOML settings file
    #[arg(long, global = true, env = "CASEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log profile (dev, prod)
    #[arg(long, global = true, env = "CASEWATCH_LOG_PROFILE", default_value = "dev")]
    log_profile: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile a collector capture against the canonical snapshot
    Run(commands::run::RunArgs),
    /// Show the canonical version, pending promotion and recent runs
    Status(commands::status::StatusArgs),
    /// Query the change log
    Log(commands::log::LogArgs),
    /// Statistics of the canonical snapshot
    Stats(commands::stats::StatsArgs),
    /// Resolve a failed promotion
    Resolve(commands::resolve::ResolveArgs),
    /// Write the canonical snapshot as CSV
    Export(commands::export::ExportArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init(Profile::from_name(&cli.log_profile).unwrap_or(Profile::Development));

    let ctx = commands::Context {
        db_path: cli.db,
        config_path: cli.config,
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(&ctx, args),
        Commands::Status(args) => commands::status::execute(&ctx, args).map(|()| 0),
        Commands::Log(args) => commands::log::execute(&ctx, args).map(|()| 0),
        Commands::Stats(args) => commands::stats::execute(&ctx, args).map(|()| 0),
        Commands::Resolve(args) => commands::resolve::execute(&ctx, args),
        Commands::Export(args) => commands::export::execute(&ctx, args).map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
