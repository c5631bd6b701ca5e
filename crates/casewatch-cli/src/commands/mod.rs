//! Subcommands and the state they share

pub mod export;
pub mod log;
pub mod resolve;
pub mod run;
pub mod stats;
pub mod status;

use casewatch_core::errors::Result;
use casewatch_engine::{ReconcileConfig, RunLock, RunOutcome};
use rusqlite::Connection;
use std::path::PathBuf;

/// Global options resolved from flags and environment
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl Context {
    pub fn config(&self) -> Result<ReconcileConfig> {
        match &self.config_path {
            Some(path) => ReconcileConfig::load(path),
            None => Ok(ReconcileConfig::default()),
        }
    }

    pub fn open_store(&self) -> Result<Connection> {
        casewatch_store::db::open_store(&self.db_path)
    }

    /// Take the run lock next to the store
    pub fn lock(&self, config: &ReconcileConfig) -> Result<RunLock> {
        RunLock::acquire(&RunLock::path_for(&self.db_path), config.lock_timeout())
    }
}

/// Print a run outcome; the summary goes to stdout, failures to stderr
pub fn print_outcome(
    outcome: &RunOutcome,
    json: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    match outcome {
        RunOutcome::Completed(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report.events)?);
            } else {
                print!("{}", casewatch_core::render_change_summary(&report.events));
                println!("run: {}", report.run_id);
                println!("canonical version: {}", report.version_id);
                if let Some(path) = &report.artifact_path {
                    println!("artifact: {}", path.display());
                }
            }
            if report.counts.skipped > 0 {
                eprintln!("Warning: {} record(s) skipped", report.counts.skipped);
            }
            if report.counts.duplicates > 0 {
                eprintln!(
                    "Warning: {} duplicate record(s) dropped, first occurrence kept:",
                    report.counts.duplicates
                );
                for (id, occurrences) in &report.duplicates {
                    eprintln!("  {}: {} occurrences", id, occurrences);
                }
            }
            if let Some(err) = &report.delivery_error {
                eprintln!("Warning: change set delivery failed: {}", err);
            }
        }
        RunOutcome::Aborted {
            run_id,
            stage,
            reason,
        } => {
            eprintln!("Run {} aborted during {}: {}", run_id, stage, reason);
            eprintln!("The canonical snapshot is unchanged.");
            if reason.kind().is_transient() {
                eprintln!("Nothing was promoted; the run can be retried with the same input.");
            }
        }
        RunOutcome::FatalPromotionFailure {
            run_id,
            version_id,
            reason,
        } => {
            eprintln!(
                "Run {} could not promote version {}: {}",
                run_id, version_id, reason
            );
            eprintln!("Further runs are blocked. Use `casewatch resolve --resume` or `--abandon`.");
        }
    }
    Ok(())
}
