//! Core types shared across casewatch crates
//!
//! This crate provides foundational types used by the error, logging and
//! reconciliation layers:
//!
//! - **Correlation types**: RunId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::RunId;
