//! casewatch core - pure reconciliation kernel
//!
//! This crate holds everything about a reconciliation run that does not
//! touch storage:
//! - Record, snapshot, change event and artifact models
//! - Staging of collector output (validation, partition, first-wins dedup)
//! - The three-way diff between canonical and staged snapshots
//! - Tracking of first appearances in the excluded category
//! - The structured error type and the logging facility shared by all crates

pub mod diff;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod staging;
pub mod tracker;

#[doc(hidden)]
pub use casewatch_core_types as types;

// Re-export commonly used types
pub use casewatch_core_types::RunId;
pub use diff::{diff, render_change_summary, DiffSummary};
pub use errors::{ExError, ExErrorKind, Result};
pub use model::{
    ArtifactBlob, ArtifactEntry, CanonicalState, ChangeEvent, ChangeKind, RawRecord, Record,
    SkipReason, Snapshot,
};
pub use staging::{stage, stage_raw, stage_values, StagedSnapshot, StagingReport};
pub use tracker::track_excluded;
