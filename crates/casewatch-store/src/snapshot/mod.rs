//! Versioned snapshot storage.
//!
//! Every run stages its capture into a fresh *version*: the main records in
//! `snapshot_records` and the excluded ids in `snapshot_excluded`, both keyed
//! by the same version id. The canonical state is whatever version the
//! single-row `canonical_head` pointer references.
//!
//! ## Responsibilities
//!
//! - Write a staged version in one transaction (`stage`)
//! - Seal a version and flip the head pointer in one transaction (`promote`)
//! - Garbage-collect superseded and discarded versions after promotion
//! - Read the canonical state and its statistics (`query`)
//!
//! ## Non-Responsibilities
//!
//! - Diffing and tracking (handled by `casewatch-core`)
//! - Run orchestration and ordering (handled by `casewatch-engine`)

pub mod promote;
pub mod query;
pub mod stage;

// Re-export primary types
pub use promote::{gc_versions, promote, PromotionOutcome};
pub use query::{canonical_stats, head_version_id, load_canonical, load_version, CanonicalStats};
pub use stage::{discard_version, stage_snapshot};
