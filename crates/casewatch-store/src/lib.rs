//! casewatch store - SQLite persistence for reconciliation runs
//!
//! Provides:
//! - SQLite schema with a checksummed migrations framework
//! - Versioned snapshot storage with a canonical head pointer
//! - The append-only change log and its artifact export
//! - The run ledger
//! - Atomic artifact publication

pub mod artifact;
pub mod changelog;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod runs;
pub mod snapshot;

// Re-export key types
pub use artifact::ArtifactStore;
pub use changelog::{EventFilter, LoggedEvent};
pub use errors::Result;
pub use runs::{RunCounts, RunRow, RunState};
pub use snapshot::{CanonicalStats, PromotionOutcome};
