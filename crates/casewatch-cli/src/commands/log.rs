//! Change log query command
//!
//! Usage: casewatch log [--run <RUN_ID>] [--record <ID>] [--kind <KIND>] [--limit <N>] [--json]

use super::Context;
use casewatch_core::model::{ChangeEvent, ChangeKind};
use casewatch_core_types::RunId;
use casewatch_store::changelog::{list_events, EventFilter};
use clap::Args;

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Only events of this run
    #[arg(long)]
    pub run: Option<String>,

    /// Only events about this record id
    #[arg(long)]
    pub record: Option<String>,

    /// Only events of this kind (new, modified, deleted, expiring_added)
    #[arg(long)]
    pub kind: Option<String>,

    /// Show only the N most recent matching events
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print events as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: LogArgs) -> Result<(), Box<dyn std::error::Error>> {
    let kind = match args.kind.as_deref() {
        Some(label) => Some(
            ChangeKind::parse(label).ok_or_else(|| format!("Unknown event kind: {}", label))?,
        ),
        None => None,
    };

    let filter = EventFilter {
        run_id: args.run.map(RunId::from_string),
        record_id: args.record,
        kind,
        limit: args.limit,
    };

    let conn = ctx.open_store()?;
    let events = list_events(&conn, &filter)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    for logged in &events {
        println!(
            "{} {} #{:<3} {:<14} {} {}",
            logged.recorded_at,
            logged.run_id,
            logged.seq,
            logged.event.kind(),
            logged.event.id(),
            transition(&logged.event)
        );
    }
    if events.is_empty() {
        println!("no events");
    }

    Ok(())
}

fn transition(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::New {
            status, category, ..
        } => format!("[{}] {}", category, status),
        ChangeEvent::Modified {
            old_status,
            new_status,
            old_category,
            new_category,
            ..
        } => format!(
            "[{}] {} -> [{}] {}",
            old_category, old_status, new_category, new_status
        ),
        ChangeEvent::Deleted {
            status, category, ..
        } => format!("[{}] {}", category, status),
        ChangeEvent::ExpiringAdded { category, .. } => format!("[{}]", category),
    }
}
