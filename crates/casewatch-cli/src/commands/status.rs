//! Store status command
//!
//! Usage: casewatch status [--limit <N>]

use super::Context;
use casewatch_engine::pending_promotion;
use casewatch_store::runs::list_runs;
use casewatch_store::snapshot::head_version_id;
use clap::Args;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Number of recent runs to list
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

pub fn execute(ctx: &Context, args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let conn = ctx.open_store()?;

    match head_version_id(&conn)? {
        Some(version_id) => println!("canonical version: {}", version_id),
        None => println!("canonical version: none"),
    }

    if let Some(pending) = pending_promotion(&conn)? {
        println!(
            "pending promotion: run {} (version {})",
            pending.run_id,
            pending
                .staged_version_id
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }

    let runs = list_runs(&conn, args.limit)?;
    if runs.is_empty() {
        println!("no runs");
        return Ok(());
    }

    println!("recent runs:");
    for run in runs {
        println!(
            "  {}  {:<16} {:<10} events={:<4} started={}",
            run.run_id,
            run.state.as_str(),
            run.stage,
            run.event_count,
            run.started_at
        );
        if let Some(detail) = run.detail {
            println!("      {}", detail);
        }
    }

    Ok(())
}
