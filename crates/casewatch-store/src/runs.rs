//! Run ledger.
//!
//! One row per reconciliation run in the `runs` table: lifecycle state, the
//! last stage reached, staging counts, the staged version and the published
//! artifact. A run left in `promotion_failed` blocks every later run until it
//! is resumed or abandoned.

#![allow(clippy::result_large_err)]

use crate::errors::{sqlite_error, Result};
use casewatch_core::errors::{ExError, ExErrorKind};
use casewatch_core_types::RunId;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

/// Lifecycle state of a run row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Aborted,
    PromotionFailed,
    Abandoned,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
            RunState::PromotionFailed => "promotion_failed",
            RunState::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunState::Running),
            "completed" => Some(RunState::Completed),
            "aborted" => Some(RunState::Aborted),
            "promotion_failed" => Some(RunState::PromotionFailed),
            "abandoned" => Some(RunState::Abandoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staging counts recorded on the run row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub input: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub main: usize,
    pub excluded: usize,
}

/// A row of the `runs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRow {
    pub run_id: RunId,
    pub state: RunState,
    pub stage: String,
    pub staged_version_id: Option<i64>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub counts: RunCounts,
    pub event_count: usize,
    pub artifact_path: Option<String>,
    pub artifact_digest: Option<String>,
    pub detail: Option<String>,
}

const RUN_COLUMNS: &str = "run_id, state, stage, staged_version_id, started_at, finished_at,
    input_count, accepted_count, skipped_count, duplicate_count, main_count, excluded_count,
    event_count, artifact_path, artifact_digest, detail";

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    let state: String = row.get(1)?;
    let state = RunState::parse(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown run state {:?}", state).into(),
        )
    })?;
    let count = |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)? as usize) };

    Ok(RunRow {
        run_id: RunId::from_string(row.get(0)?),
        state,
        stage: row.get(2)?,
        staged_version_id: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        counts: RunCounts {
            input: count(6)?,
            accepted: count(7)?,
            skipped: count(8)?,
            duplicates: count(9)?,
            main: count(10)?,
            excluded: count(11)?,
        },
        event_count: count(12)?,
        artifact_path: row.get(13)?,
        artifact_digest: row.get(14)?,
        detail: row.get(15)?,
    })
}

fn not_found(op: &str, run_id: &RunId) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(op)
        .with_run_id(run_id.clone())
        .with_message("run not found")
}

/// Insert a new run in `running` state
pub fn create_run(conn: &Connection, run_id: &RunId, stage: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (run_id, state, stage, started_at) VALUES (?1, 'running', ?2, ?3)",
        rusqlite::params![run_id.as_str(), stage, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| sqlite_error("create_run", e))?;
    Ok(())
}

/// Record the stage a run has reached
pub fn set_stage(conn: &Connection, run_id: &RunId, stage: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE runs SET stage = ?2 WHERE run_id = ?1",
            rusqlite::params![run_id.as_str(), stage],
        )
        .map_err(|e| sqlite_error("set_stage", e))?;
    if updated == 0 {
        return Err(not_found("set_stage", run_id));
    }
    Ok(())
}

/// Record the staged version and staging counts
pub fn record_staging(
    conn: &Connection,
    run_id: &RunId,
    version_id: i64,
    counts: &RunCounts,
) -> Result<()> {
    conn.execute(
        "UPDATE runs SET
            staged_version_id = ?2,
            input_count = ?3, accepted_count = ?4, skipped_count = ?5,
            duplicate_count = ?6, main_count = ?7, excluded_count = ?8
         WHERE run_id = ?1",
        rusqlite::params![
            run_id.as_str(),
            version_id,
            counts.input as i64,
            counts.accepted as i64,
            counts.skipped as i64,
            counts.duplicates as i64,
            counts.main as i64,
            counts.excluded as i64,
        ],
    )
    .map_err(|e| sqlite_error("record_staging", e))?;
    Ok(())
}

/// Record how many events the run appended to the change log
pub fn record_event_count(conn: &Connection, run_id: &RunId, event_count: usize) -> Result<()> {
    conn.execute(
        "UPDATE runs SET event_count = ?2 WHERE run_id = ?1",
        rusqlite::params![run_id.as_str(), event_count as i64],
    )
    .map_err(|e| sqlite_error("record_event_count", e))?;
    Ok(())
}

/// Record where the run's artifact was published and its digest
pub fn record_artifact(conn: &Connection, run_id: &RunId, path: &str, digest: &str) -> Result<()> {
    conn.execute(
        "UPDATE runs SET artifact_path = ?2, artifact_digest = ?3 WHERE run_id = ?1",
        rusqlite::params![run_id.as_str(), path, digest],
    )
    .map_err(|e| sqlite_error("record_artifact", e))?;
    Ok(())
}

/// Forget a withdrawn artifact
///
/// Rows without an artifact are left untouched.
pub fn clear_artifact(conn: &Connection, run_id: &RunId) -> Result<()> {
    conn.execute(
        "UPDATE runs SET artifact_path = NULL, artifact_digest = NULL
         WHERE run_id = ?1 AND artifact_path IS NOT NULL",
        [run_id.as_str()],
    )
    .map_err(|e| sqlite_error("clear_artifact", e))?;
    Ok(())
}

/// Move a run to its final (or blocking) state
pub fn finish_run(
    conn: &Connection,
    run_id: &RunId,
    state: RunState,
    detail: Option<&str>,
) -> Result<()> {
    let finished_at = match state {
        RunState::Running | RunState::PromotionFailed => None,
        _ => Some(chrono::Utc::now().to_rfc3339()),
    };
    let updated = conn
        .execute(
            "UPDATE runs SET state = ?2, detail = ?3, finished_at = ?4 WHERE run_id = ?1",
            rusqlite::params![run_id.as_str(), state.as_str(), detail, finished_at],
        )
        .map_err(|e| sqlite_error("finish_run", e))?;
    if updated == 0 {
        return Err(not_found("finish_run", run_id));
    }
    Ok(())
}

/// Fetch one run
pub fn get_run(conn: &Connection, run_id: &RunId) -> Result<Option<RunRow>> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1"),
        [run_id.as_str()],
        row_to_run,
    )
    .optional()
    .map_err(|e| sqlite_error("get_run", e))
}

/// Most recent runs first
pub fn list_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC, run_id DESC LIMIT ?1"
        ))
        .map_err(|e| sqlite_error("list_runs", e))?;
    let rows = stmt
        .query_map([limit as i64], row_to_run)
        .map_err(|e| sqlite_error("list_runs", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sqlite_error("list_runs", e))?;
    Ok(rows)
}

/// The unresolved failed promotion, if any
pub fn blocking_run(conn: &Connection) -> Result<Option<RunRow>> {
    conn.query_row(
        &format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE state = 'promotion_failed'
             ORDER BY started_at LIMIT 1"
        ),
        [],
        row_to_run,
    )
    .optional()
    .map_err(|e| sqlite_error("blocking_run", e))
}

/// Runs left in `running` state (a process died mid-run)
pub fn stale_runs(conn: &Connection) -> Result<Vec<RunRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE state = 'running' ORDER BY started_at"
        ))
        .map_err(|e| sqlite_error("stale_runs", e))?;
    let rows = stmt
        .query_map([], row_to_run)
        .map_err(|e| sqlite_error("stale_runs", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sqlite_error("stale_runs", e))?;
    Ok(rows)
}
