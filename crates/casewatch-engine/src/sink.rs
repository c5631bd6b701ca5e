//! Downstream change sinks.
//!
//! After a run's version has been promoted, its change set is handed to a
//! [`ChangeSink`]: the notifier or retrieval trigger that lives outside this
//! workspace. Delivery is at-least-once; a collaborator that must not act
//! twice can dedupe on the run id, which is also the artifact's file name.

#![allow(clippy::result_large_err)]

use casewatch_core::errors::ExError;
use casewatch_core::model::ChangeEvent;
use casewatch_core::DiffSummary;
use casewatch_core_types::RunId;
use std::path::Path;

/// What a sink receives for one promoted run
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub run_id: &'a RunId,
    pub events: &'a [ChangeEvent],
    /// Published artifact; `None` when the run had no events
    pub artifact_path: Option<&'a Path>,
}

/// Receiver of promoted change sets
pub trait ChangeSink: Send + Sync {
    /// Deliver a promoted change set.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::ExternalService` when the collaborator rejected
    /// the delivery. The run stays completed; the failure is recorded on it.
    fn deliver(&self, delivery: &Delivery<'_>) -> std::result::Result<(), ExError>;
}

/// Discards every delivery (library default and tests that ignore delivery)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn deliver(&self, _: &Delivery<'_>) -> std::result::Result<(), ExError> {
        Ok(())
    }
}

/// Logs a one-line summary of each delivery (CLI default)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ChangeSink for LogSink {
    fn deliver(&self, delivery: &Delivery<'_>) -> std::result::Result<(), ExError> {
        let summary = DiffSummary::from_events(delivery.events);
        tracing::info!(
            run_id = %delivery.run_id,
            event_count = summary.total(),
            new = summary.new,
            modified = summary.modified,
            deleted = summary.deleted,
            expiring_added = summary.expiring_added,
            artifact = ?delivery.artifact_path,
            "Change set ready"
        );
        Ok(())
    }
}
