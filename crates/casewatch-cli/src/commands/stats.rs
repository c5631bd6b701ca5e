//! Canonical snapshot statistics
//!
//! Usage: casewatch stats [--json]

use super::Context;
use casewatch_store::snapshot::canonical_stats;
use clap::Args;

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: StatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let conn = ctx.open_store()?;
    let stats = canonical_stats(&conn)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    match stats.version_id {
        Some(version_id) => println!("canonical version: {}", version_id),
        None => println!("canonical version: none"),
    }
    println!("records: {}", stats.record_count);
    println!("excluded: {}", stats.excluded_count);

    if !stats.by_status.is_empty() {
        println!("by status:");
        for (status, count) in &stats.by_status {
            println!("  {:<24} {}", status, count);
        }
    }
    if !stats.by_category.is_empty() {
        println!("by category:");
        for (category, count) in &stats.by_category {
            println!("  {:<24} {}", category, count);
        }
    }

    Ok(())
}
