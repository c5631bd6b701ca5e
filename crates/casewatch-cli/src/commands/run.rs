//! Reconciliation run command
//!
//! Usage: casewatch run [INPUT] [--excluded-category <NAME>] [--artifact-dir <DIR>] [--json]
//!
//! Exit codes: 0 completed, 1 aborted or error, 2 promotion failed or blocked.

use super::{print_outcome, Context};
use casewatch_core::errors::ExErrorKind;
use casewatch_core::staging::parse_input;
use casewatch_engine::{reconcile, LogSink, RunControl};
use clap::Args;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Collector output (JSON array); stdin when omitted or `-`
    pub input: Option<PathBuf>,

    /// Category tracked for first appearance only
    #[arg(long)]
    pub excluded_category: Option<String>,

    /// Directory receiving the run artifact
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Print the change set as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: RunArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = ctx.config()?;
    if let Some(category) = args.excluded_category {
        config.excluded_category = category;
    }
    if let Some(dir) = args.artifact_dir {
        config.artifact_dir = dir;
    }
    config.validate()?;

    let bytes = read_input(args.input.as_deref())?;
    let values = parse_input(&bytes)?;
    tracing::debug!(records = values.len(), "Read collector output");

    let _lock = ctx.lock(&config)?;
    let mut conn = ctx.open_store()?;

    let control = match config.run_timeout() {
        Some(timeout) => RunControl::new().with_timeout(timeout),
        None => RunControl::new(),
    };

    let outcome = match reconcile(&mut conn, values, &config, &control, &LogSink) {
        Ok(outcome) => outcome,
        Err(e) if e.kind() == ExErrorKind::PromotionBlocked => {
            eprintln!("Error: {}", e);
            eprintln!("Use `casewatch resolve --resume` or `casewatch resolve --abandon` first.");
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    print_outcome(&outcome, args.json)?;
    Ok(outcome.exit_code())
}

fn read_input(path: Option<&Path>) -> std::io::Result<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read(path),
        _ => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}
