//! Structured logging for casewatch binaries and tests
//!
//! Binaries call [`init`] once with a [`Profile`]; libraries only emit
//! `tracing` events. Run boundaries are logged through the operation
//! macros so every `reconcile`, `resume_promotion` and `abandon_promotion`
//! produces a `start` line and exactly one `end` or `end_error` line:
//!
//! ```rust
//! use casewatch_core::{log_op_end, log_op_start};
//!
//! log_op_start!("reconcile", input_len = 3usize);
//! log_op_end!("reconcile", duration_ms = 12u64, event_count = 2usize);
//! ```
//!
//! Tests install [`init_test_capture`] instead and assert on the captured
//! fields.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
