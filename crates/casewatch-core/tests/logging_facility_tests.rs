#![allow(clippy::unwrap_used, clippy::expect_used)]

use casewatch_core::errors::{ExError, ExErrorKind};
use casewatch_core::logging_facility::test_capture::init_test_capture;
use casewatch_core::model::SkipReason;
use casewatch_core::{log_op_end, log_op_error, log_op_start};
use casewatch_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_ERR_CODE, FIELD_ERR_KIND,
};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, run_id = "r-1");

    let starts = capture.find(op_name, EVENT_START);
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].field("run_id"), Some("r-1"));
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42u64);

    let ends = capture.find(op_name, EVENT_END);
    assert_eq!(ends.len(), 1, "Should have exactly one end event");
    assert_eq!(ends[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_includes_kind_and_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = ExError::new(ExErrorKind::PromotionFailed).with_op("promote");
    log_op_error!(op_name, err, duration_ms = 10u64);

    let errors = capture.find(op_name, EVENT_END_ERROR);
    assert_eq!(errors.len(), 1, "Should have exactly one error event");
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_PROMOTION_FAILED"));
    assert_eq!(errors[0].field(FIELD_ERR_KIND), Some("PromotionFailed"));
}

#[test]
fn test_log_op_error_converts_leaf_errors() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_leaf_unique_4";

    log_op_error!(
        op_name,
        SkipReason::MissingId,
        duration_ms = 1u64,
        index = 3u64
    );

    let errors = capture.find(op_name, EVENT_END_ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_MALFORMED_RECORD"));
    assert_eq!(errors[0].field("index"), Some("3"));
}

#[test]
fn test_boundary_single_start_end() {
    let capture = init_test_capture();
    let op_name = "test_boundary_unique_5";

    log_op_start!(op_name);
    log_op_end!(op_name, duration_ms = 7u64);

    assert_eq!(capture.find(op_name, EVENT_START).len(), 1);
    assert_eq!(capture.find(op_name, EVENT_END).len(), 1);
    assert!(capture.find(op_name, EVENT_END_ERROR).is_empty());
}

#[test]
#[should_panic(expected = "Expected event")]
fn test_assert_event_exists_fails_for_unknown_op() {
    let capture = init_test_capture();
    capture.assert_event_exists("nonexistent_op_truly_unique_999", EVENT_START);
}

#[test]
fn test_count_events() {
    let capture = init_test_capture();
    let op1 = "test_count_events_op1_unique_6";
    let op2 = "test_count_events_op2_unique_6";

    log_op_start!(op1);
    log_op_start!(op2);
    log_op_end!(op1, duration_ms = 10u64);

    let start_count = capture.count_events(|e| {
        e.event.as_deref() == Some(EVENT_START)
            && (e.op.as_deref() == Some(op1) || e.op.as_deref() == Some(op2))
    });
    assert_eq!(start_count, 2);
}
