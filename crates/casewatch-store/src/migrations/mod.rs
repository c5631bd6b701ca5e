//! Migration framework
//!
//! Provides:
//! - Migration runner with checksums recorded in `schema_version`
//! - Idempotent application, with tamper detection on re-run
//! - Embedded SQL migrations

mod embedded;
mod runner;

pub use runner::{applied_migrations, apply_migrations};
