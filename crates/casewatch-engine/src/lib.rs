//! casewatch engine - Orchestration layer
//!
//! Drives one reconciliation run from raw collector output to a promoted
//! canonical state, coordinating the pure kernel in `casewatch-core` with
//! the persistence layer in `casewatch-store`.
//!
//! ## Logging Ownership
//!
//! The engine owns lifecycle logging for runs:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal details.

pub mod config;
pub mod lock;
pub mod run;
pub mod sink;

pub use config::ReconcileConfig;
pub use lock::RunLock;
pub use run::{
    abandon_promotion, pending_promotion, reconcile, resume_promotion, RunControl, RunOutcome,
    RunReport, RunStage,
};
pub use sink::{ChangeSink, Delivery, LogSink, NoopSink};
