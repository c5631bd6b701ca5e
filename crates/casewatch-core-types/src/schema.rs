//! Field keys and event names shared by the logging macros, the capture
//! layer and log consumers.
//!
//! Every run-boundary line carries `component`, `op`, `event` and, on the
//! closing line, `duration_ms`. Failures add the `err.*` fields.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

/// Reconciliation run the line belongs to
pub const FIELD_RUN_ID: &str = "run_id";
/// Run stage (`staging`, `diffing`, ...) on stage and abort lines
pub const FIELD_STAGE: &str = "stage";

pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";
pub const FIELD_ERR_MESSAGE: &str = "err.message";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
