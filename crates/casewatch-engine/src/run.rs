//! Reconciliation run orchestration.
//!
//! A run moves strictly through
//! `Idle → Staging → Diffing → Tracking → Logging → Promoting → Completed`.
//!
//! ## Ordering
//!
//! 1. Stage the collector output into a new storage version
//! 2. Diff it against the canonical main snapshot
//! 3. Track first appearances in the excluded category
//! 4. Commit the events to the change log, then publish the artifact
//! 5. Promote the staged version (head pointer flip)
//! 6. Hand the change set to the [`ChangeSink`]
//!
//! Any failure before promotion aborts the run: the staged version is
//! discarded and the canonical state is untouched. A failed promotion is
//! fatal and leaves the run in `promotion_failed`, which blocks every later
//! run until [`resume_promotion`] or [`abandon_promotion`] resolves it.
//!
//! Callers are expected to hold the [`RunLock`](crate::RunLock) for the
//! duration of any function in this module.

#![allow(clippy::result_large_err)]

use crate::config::ReconcileConfig;
use crate::sink::{ChangeSink, Delivery};
use casewatch_core::errors::{ExError, ExErrorKind, Result};
use casewatch_core::model::ChangeEvent;
use casewatch_core::staging::{stage_values, SkippedRecord, StagedSnapshot};
use casewatch_core::{diff, track_excluded, DiffSummary};
use casewatch_core::{log_op_end, log_op_error, log_op_start};
use casewatch_core_types::RunId;
use casewatch_store::artifact::ArtifactStore;
use casewatch_store::changelog;
use casewatch_store::runs::{self, RunCounts, RunRow, RunState};
use casewatch_store::snapshot::{self, PromotionOutcome};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stage of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunStage {
    Idle,
    Staging,
    Diffing,
    Tracking,
    Logging,
    Promoting,
    Completed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Staging => "staging",
            RunStage::Diffing => "diffing",
            RunStage::Tracking => "tracking",
            RunStage::Logging => "logging",
            RunStage::Promoting => "promoting",
            RunStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cancellation flag and optional deadline for a run
///
/// Both are checked when entering each stage up to and including Promoting.
/// Promotion itself is never interrupted. Clones share the same flag, so a
/// clone handed to another thread can cancel the run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the run once `timeout` has elapsed from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Request cancellation; takes effect at the next stage boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, run_id: &RunId, stage: RunStage) -> Result<()> {
        if self.is_cancelled() {
            return Err(ExError::new(ExErrorKind::Cancelled)
                .with_op("run_checkpoint")
                .with_run_id(run_id.clone())
                .with_message(format!("cancelled before {}", stage)));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ExError::new(ExErrorKind::Timeout)
                    .with_op("run_checkpoint")
                    .with_run_id(run_id.clone())
                    .with_message(format!("run deadline passed before {}", stage)));
            }
        }
        Ok(())
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// The version that is now canonical
    pub version_id: i64,
    pub counts: RunCounts,
    /// Records rejected during staging (empty for a resumed promotion)
    pub skipped: Vec<SkippedRecord>,
    /// Main-set ids seen more than once (empty for a resumed promotion)
    pub duplicates: BTreeMap<String, usize>,
    pub events: Vec<ChangeEvent>,
    pub summary: DiffSummary,
    pub artifact_path: Option<PathBuf>,
    pub promotion: PromotionOutcome,
    /// Set when the change sink rejected the delivery
    pub delivery_error: Option<ExError>,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Failed before promotion; the canonical state is unchanged.
    /// `stage` is the stage that failed or was about to start.
    Aborted {
        run_id: RunId,
        stage: RunStage,
        reason: ExError,
    },
    /// Promotion failed; later runs are blocked until this one is resolved
    FatalPromotionFailure {
        run_id: RunId,
        version_id: i64,
        reason: ExError,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &RunId {
        match self {
            RunOutcome::Completed(report) => &report.run_id,
            RunOutcome::Aborted { run_id, .. }
            | RunOutcome::FatalPromotionFailure { run_id, .. } => run_id,
        }
    }

    /// Process exit code: 0 completed, 1 aborted, 2 fatal promotion failure
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) => 0,
            RunOutcome::Aborted { .. } => 1,
            RunOutcome::FatalPromotionFailure { .. } => 2,
        }
    }
}

/// Run one reconciliation over the elements of a collector JSON array
///
/// ## Returns
///
/// The run outcome. Aborts and promotion failures are outcomes, not errors.
///
/// ## Errors
///
/// - `PromotionBlocked`: an earlier promotion failure is unresolved; no run
///   was started
/// - `Persistence`: the run could not be registered in the ledger
pub fn reconcile(
    conn: &mut Connection,
    input: Vec<Value>,
    config: &ReconcileConfig,
    control: &RunControl,
    sink: &dyn ChangeSink,
) -> Result<RunOutcome> {
    log_op_start!("reconcile", input_len = input.len());
    let start = Instant::now();

    let result = reconcile_impl(conn, input, config, control, sink);
    log_outcome("reconcile", &result, start);
    result
}

fn reconcile_impl(
    conn: &mut Connection,
    input: Vec<Value>,
    config: &ReconcileConfig,
    control: &RunControl,
    sink: &dyn ChangeSink,
) -> Result<RunOutcome> {
    if let Some(blocking) = pending_promotion(conn)? {
        return Err(ExError::new(ExErrorKind::PromotionBlocked)
            .with_op("reconcile")
            .with_run_id(blocking.run_id)
            .with_message("an earlier promotion failed; resume or abandon it first"));
    }
    recover_interrupted(conn)?;

    let run_id = RunId::new();
    runs::create_run(conn, &run_id, RunStage::Staging.as_str())?;

    let mut staged_version = None;
    let prepared = match prepare(conn, &run_id, input, config, control, &mut staged_version) {
        Ok(prepared) => prepared,
        Err((stage, reason)) => {
            return Ok(abort(conn, &run_id, config, stage, staged_version, reason))
        }
    };
    let version_id = prepared.version_id;

    let promotion = match snapshot::promote(conn, version_id) {
        Ok(promotion) => promotion,
        Err(e) => return Ok(fail_promotion(conn, &run_id, version_id, e)),
    };

    let delivery_error = complete(
        conn,
        &run_id,
        &prepared.events,
        prepared.artifact_path.as_deref(),
        sink,
    );

    let report = &prepared.staged.report;
    Ok(RunOutcome::Completed(RunReport {
        counts: counts_of(&prepared.staged),
        skipped: report.skipped.clone(),
        duplicates: report.duplicates.clone(),
        summary: DiffSummary::from_events(&prepared.events),
        run_id,
        version_id,
        events: prepared.events,
        artifact_path: prepared.artifact_path,
        promotion,
        delivery_error,
    }))
}

struct Prepared {
    staged: StagedSnapshot,
    version_id: i64,
    events: Vec<ChangeEvent>,
    artifact_path: Option<PathBuf>,
}

/// Stages up to and including the pre-promotion checkpoint
fn prepare(
    conn: &mut Connection,
    run_id: &RunId,
    input: Vec<Value>,
    config: &ReconcileConfig,
    control: &RunControl,
    staged_version: &mut Option<i64>,
) -> std::result::Result<Prepared, (RunStage, ExError)> {
    let at = |stage: RunStage| move |e: ExError| (stage, e);

    // Staging
    enter(conn, run_id, control, RunStage::Staging).map_err(at(RunStage::Staging))?;
    let staged = stage_values(input, &config.excluded_category);
    for skipped in &staged.report.skipped {
        tracing::warn!(
            run_id = %run_id,
            index = skipped.index,
            reason = %skipped.reason,
            "Skipped collector record"
        );
    }
    let version_id =
        snapshot::stage_snapshot(conn, run_id, &staged).map_err(at(RunStage::Staging))?;
    *staged_version = Some(version_id);
    runs::record_staging(conn, run_id, version_id, &counts_of(&staged))
        .map_err(at(RunStage::Staging))?;

    // Diffing
    enter(conn, run_id, control, RunStage::Diffing).map_err(at(RunStage::Diffing))?;
    let canonical = snapshot::load_canonical(conn).map_err(at(RunStage::Diffing))?;
    let mut events = diff(&canonical.main, &staged.main);

    // Tracking
    enter(conn, run_id, control, RunStage::Tracking).map_err(at(RunStage::Tracking))?;
    events.extend(track_excluded(
        &staged.excluded,
        &canonical.excluded,
        &config.excluded_category,
    ));

    // Logging
    enter(conn, run_id, control, RunStage::Logging).map_err(at(RunStage::Logging))?;
    append_events(conn, run_id, &events).map_err(at(RunStage::Logging))?;
    let artifact_path = publish_artifact(conn, run_id, config).map_err(at(RunStage::Logging))?;

    // Last point where the run can still be abandoned without side effects on
    // the canonical state.
    enter(conn, run_id, control, RunStage::Promoting).map_err(at(RunStage::Promoting))?;

    Ok(Prepared {
        staged,
        version_id,
        events,
        artifact_path,
    })
}

fn enter(conn: &Connection, run_id: &RunId, control: &RunControl, stage: RunStage) -> Result<()> {
    control.checkpoint(run_id, stage)?;
    runs::set_stage(conn, run_id, stage.as_str())?;
    tracing::info!(run_id = %run_id, stage = stage.as_str(), "Entering stage");
    Ok(())
}

fn append_events(conn: &mut Connection, run_id: &RunId, events: &[ChangeEvent]) -> Result<()> {
    let tx = conn.transaction().map_err(|e| {
        ExError::new(ExErrorKind::Persistence)
            .with_op("append_events")
            .with_message(e.to_string())
    })?;
    changelog::append(&tx, run_id, events)?;
    runs::record_event_count(&tx, run_id, events.len())?;
    tx.commit().map_err(|e| {
        ExError::new(ExErrorKind::Persistence)
            .with_op("append_events")
            .with_run_id(run_id.clone())
            .with_message(e.to_string())
    })
}

fn publish_artifact(
    conn: &Connection,
    run_id: &RunId,
    config: &ReconcileConfig,
) -> Result<Option<PathBuf>> {
    match changelog::export_run(conn, run_id)? {
        None => Ok(None),
        Some(blob) => ArtifactStore::new(&config.artifact_dir)
            .publish(conn, &blob)
            .map(Some),
    }
}

fn counts_of(staged: &StagedSnapshot) -> RunCounts {
    RunCounts {
        input: staged.report.total,
        accepted: staged.report.accepted,
        skipped: staged.report.skipped.len(),
        duplicates: staged.report.duplicates_dropped(),
        main: staged.main.len(),
        excluded: staged.excluded.len(),
    }
}

/// Roll back what a failed run left behind: the staged version and any
/// published artifact. The canonical state was never touched.
fn abort(
    conn: &Connection,
    run_id: &RunId,
    config: &ReconcileConfig,
    stage: RunStage,
    staged_version: Option<i64>,
    reason: ExError,
) -> RunOutcome {
    if let Err(e) = ArtifactStore::new(&config.artifact_dir).withdraw(conn, run_id) {
        tracing::warn!(run_id = %run_id, error = %e, "Could not withdraw artifact");
    }
    if let Some(version_id) = staged_version {
        if let Err(e) = snapshot::discard_version(conn, version_id) {
            tracing::warn!(run_id = %run_id, version_id, error = %e, "Could not discard staged version");
        }
    }
    let detail = reason.to_string();
    if let Err(e) = runs::finish_run(conn, run_id, RunState::Aborted, Some(detail.as_str())) {
        tracing::warn!(run_id = %run_id, error = %e, "Could not mark run aborted");
    }

    RunOutcome::Aborted {
        run_id: run_id.clone(),
        stage,
        reason,
    }
}

fn fail_promotion(
    conn: &Connection,
    run_id: &RunId,
    version_id: i64,
    cause: ExError,
) -> RunOutcome {
    let reason = ExError::new(ExErrorKind::PromotionFailed)
        .with_op("promote")
        .with_entity_id(version_id.to_string())
        .with_run_id(run_id.clone())
        .with_message("staged version could not be made canonical")
        .with_source(cause);

    // If this write fails too, the run stays `running` at stage `promoting`,
    // which `pending_promotion` treats as blocking as well.
    if let Err(e) = runs::finish_run(
        conn,
        run_id,
        RunState::PromotionFailed,
        Some(reason.to_string().as_str()),
    ) {
        tracing::error!(run_id = %run_id, error = %e, "Could not mark run promotion_failed");
    }

    RunOutcome::FatalPromotionFailure {
        run_id: run_id.clone(),
        version_id,
        reason,
    }
}

/// Post-promotion bookkeeping: mark completed, collect old versions, deliver
///
/// Returns the delivery error, if the sink rejected the change set.
fn complete(
    conn: &Connection,
    run_id: &RunId,
    events: &[ChangeEvent],
    artifact_path: Option<&Path>,
    sink: &dyn ChangeSink,
) -> Option<ExError> {
    let marked = runs::set_stage(conn, run_id, RunStage::Completed.as_str())
        .and_then(|_| runs::finish_run(conn, run_id, RunState::Completed, None));
    if let Err(e) = marked {
        tracing::error!(run_id = %run_id, error = %e, "Could not mark run completed");
    }

    if let Err(e) = snapshot::gc_versions(conn) {
        tracing::warn!(run_id = %run_id, error = %e, "Snapshot version GC failed");
    }

    let start = Instant::now();
    let delivery = Delivery {
        run_id,
        events,
        artifact_path,
    };
    match sink.deliver(&delivery) {
        Ok(()) => None,
        Err(e) => {
            log_op_error!(
                "deliver_changes",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                run_id = %run_id
            );
            let detail = format!("delivery failed: {}", e);
            let marked = runs::finish_run(conn, run_id, RunState::Completed, Some(detail.as_str()));
            if let Err(mark) = marked {
                tracing::warn!(run_id = %run_id, error = %mark, "Could not record delivery failure");
            }
            Some(e)
        }
    }
}

/// The run whose promotion is unresolved, if any
///
/// Besides runs marked `promotion_failed`, a run still `running` at stage
/// `promoting` counts: its process died during or right after promotion.
///
/// ## Errors
///
/// - `Persistence`: the run ledger could not be read
pub fn pending_promotion(conn: &Connection) -> Result<Option<RunRow>> {
    if let Some(row) = runs::blocking_run(conn)? {
        return Ok(Some(row));
    }
    Ok(runs::stale_runs(conn)?
        .into_iter()
        .find(|row| row.stage == RunStage::Promoting.as_str()))
}

/// Abort runs left `running` before promotion by a process that died
fn recover_interrupted(conn: &Connection) -> Result<()> {
    for row in runs::stale_runs(conn)? {
        if let Some(version_id) = row.staged_version_id {
            snapshot::discard_version(conn, version_id)?;
        }
        runs::finish_run(
            conn,
            &row.run_id,
            RunState::Aborted,
            Some("interrupted before promotion"),
        )?;
        tracing::warn!(run_id = %row.run_id, stage = %row.stage, "Recovered interrupted run");
    }
    Ok(())
}

/// Retry the promotion of the run that failed to promote
///
/// The run's logged events and published artifact are reused; nothing is
/// re-diffed. If the version had in fact become canonical, the run is simply
/// marked completed.
///
/// ## Errors
///
/// - `NotFound`: no promotion is pending
/// - `InvariantViolation`: the pending run has no staged version
pub fn resume_promotion(conn: &mut Connection, sink: &dyn ChangeSink) -> Result<RunOutcome> {
    log_op_start!("resume_promotion");
    let start = Instant::now();

    let result = resume_promotion_impl(conn, sink);
    log_outcome("resume_promotion", &result, start);
    result
}

fn resume_promotion_impl(conn: &mut Connection, sink: &dyn ChangeSink) -> Result<RunOutcome> {
    let row = pending_promotion(conn)?.ok_or_else(|| {
        ExError::new(ExErrorKind::NotFound)
            .with_op("resume_promotion")
            .with_message("no failed promotion to resume")
    })?;
    let version_id = staged_version_of(&row, "resume_promotion")?;

    let promotion = match snapshot::promote(conn, version_id) {
        Ok(promotion) => promotion,
        Err(e) => return Ok(fail_promotion(conn, &row.run_id, version_id, e)),
    };

    let events = changelog::run_events(conn, &row.run_id)?;
    let artifact_path = row.artifact_path.as_ref().map(PathBuf::from);
    let delivery_error = complete(conn, &row.run_id, &events, artifact_path.as_deref(), sink);

    Ok(RunOutcome::Completed(RunReport {
        run_id: row.run_id,
        version_id,
        counts: row.counts,
        skipped: Vec::new(),
        duplicates: BTreeMap::new(),
        summary: DiffSummary::from_events(&events),
        events,
        artifact_path,
        promotion,
        delivery_error,
    }))
}

/// Give up on the pending promotion
///
/// The staged version and the run's artifact are discarded and the run is
/// marked `abandoned`. Its events stay in the change log; the next run diffs against the unchanged
/// canonical state and reports the same changes again.
///
/// ## Returns
///
/// The resolved run and its final state (`completed` when the version had in
/// fact become canonical)
///
/// ## Errors
///
/// - `NotFound`: no promotion is pending
pub fn abandon_promotion(conn: &Connection) -> Result<(RunId, RunState)> {
    log_op_start!("abandon_promotion");
    let start = Instant::now();

    let result = abandon_promotion_impl(conn);
    match &result {
        Ok((run_id, state)) => log_op_end!(
            "abandon_promotion",
            duration_ms = start.elapsed().as_millis() as u64,
            run_id = %run_id,
            state = state.as_str()
        ),
        Err(e) => log_op_error!(
            "abandon_promotion",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        ),
    }
    result
}

fn abandon_promotion_impl(conn: &Connection) -> Result<(RunId, RunState)> {
    let row = pending_promotion(conn)?.ok_or_else(|| {
        ExError::new(ExErrorKind::NotFound)
            .with_op("abandon_promotion")
            .with_message("no failed promotion to abandon")
    })?;
    let version_id = staged_version_of(&row, "abandon_promotion")?;

    if snapshot::head_version_id(conn)? == Some(version_id) {
        runs::finish_run(
            conn,
            &row.run_id,
            RunState::Completed,
            Some("promotion had already taken effect"),
        )?;
        return Ok((row.run_id, RunState::Completed));
    }

    snapshot::discard_version(conn, version_id)?;
    if let Some(dir) = row
        .artifact_path
        .as_deref()
        .and_then(|path| Path::new(path).parent())
    {
        if let Err(e) = ArtifactStore::new(dir).withdraw(conn, &row.run_id) {
            tracing::warn!(run_id = %row.run_id, error = %e, "Could not withdraw artifact");
        }
    }
    runs::finish_run(
        conn,
        &row.run_id,
        RunState::Abandoned,
        Some("promotion abandoned; logged events kept"),
    )?;
    Ok((row.run_id, RunState::Abandoned))
}

fn staged_version_of(row: &RunRow, op: &str) -> Result<i64> {
    row.staged_version_id.ok_or_else(|| {
        ExError::new(ExErrorKind::InvariantViolation)
            .with_op(op)
            .with_run_id(row.run_id.clone())
            .with_message("pending run has no staged version")
    })
}

fn log_outcome(op: &str, result: &Result<RunOutcome>, start: Instant) {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(RunOutcome::Completed(report)) => log_op_end!(
            op,
            duration_ms = duration_ms,
            run_id = %report.run_id,
            version_id = report.version_id,
            event_count = report.events.len()
        ),
        Ok(RunOutcome::Aborted {
            run_id,
            stage,
            reason,
        }) => log_op_error!(
            op,
            reason.clone(),
            duration_ms = duration_ms,
            run_id = %run_id,
            stage = stage.as_str()
        ),
        Ok(RunOutcome::FatalPromotionFailure {
            run_id,
            version_id,
            reason,
        }) => log_op_error!(
            op,
            reason.clone(),
            duration_ms = duration_ms,
            run_id = %run_id,
            version_id = *version_id
        ),
        Err(e) => log_op_error!(op, e.clone(), duration_ms = duration_ms),
    }
}
