//! Snapshot diff engine.
//!
//! Compares the canonical main snapshot with a freshly staged one and
//! produces the ordered list of change events between them.
//!
//! ## Entry point
//!
//! ```
//! use casewatch_core::diff::{diff, render_change_summary};
//! use casewatch_core::model::{Record, Snapshot};
//!
//! let canonical: Snapshot = vec![Record::new("A", "en-cours", "en cours")].into_iter().collect();
//! let staged: Snapshot = vec![Record::new("A", "en-cours", "en instruction")].into_iter().collect();
//!
//! let events = diff(&canonical, &staged);
//! assert_eq!(events.len(), 1);
//! let summary = render_change_summary(&events);
//! assert!(summary.contains("Modified"));
//! ```
//!
//! ## Guarantees
//!
//! - **Partition**: every id in either snapshot yields at most one event, and
//!   an id yields no event exactly when it is present on both sides with the
//!   same status and category.
//! - **Determinism**: events are ordered New, then Modified, then Deleted,
//!   each group by id.
//! - **Exact comparison**: status and category are compared byte for byte,
//!   case-sensitively. Other fields never produce events.

pub mod engine;
pub mod human_summary;
pub mod model;

pub use engine::diff;
pub use human_summary::render_change_summary;
pub use model::DiffSummary;
