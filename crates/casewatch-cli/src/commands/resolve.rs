//! Failed promotion resolution
//!
//! Usage: casewatch resolve (--resume | --abandon)

use super::{print_outcome, Context};
use casewatch_engine::{abandon_promotion, resume_promotion, LogSink};
use clap::Args;

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct ResolveArgs {
    /// Retry promoting the failed run's staged version
    #[arg(long)]
    pub resume: bool,

    /// Discard the failed run's staged version and keep the canonical snapshot
    #[arg(long)]
    pub abandon: bool,
}

pub fn execute(ctx: &Context, args: ResolveArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = ctx.config()?;
    let _lock = ctx.lock(&config)?;
    let mut conn = ctx.open_store()?;

    if args.resume {
        let outcome = resume_promotion(&mut conn, &LogSink)?;
        print_outcome(&outcome, false)?;
        return Ok(outcome.exit_code());
    }

    let (run_id, state) = abandon_promotion(&conn)?;
    println!("run {}: {}", run_id, state.as_str());
    Ok(0)
}
