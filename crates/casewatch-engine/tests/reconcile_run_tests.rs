// End-to-end tests for reconciliation runs against a real store
// Covers the two-run scenario, artifacts, aborts, promotion failure and delivery

#![allow(clippy::unwrap_used, clippy::expect_used)]

use casewatch_core::errors::{ExError, ExErrorKind};
use casewatch_core::logging_facility::test_capture::init_test_capture;
use casewatch_core::model::ChangeEvent;
use casewatch_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, FIELD_DURATION_MS, FIELD_ERR_CODE, FIELD_ERR_MESSAGE, FIELD_RUN_ID,
    FIELD_STAGE,
};
use casewatch_engine::{
    abandon_promotion, reconcile, resume_promotion, ChangeSink, Delivery, NoopSink,
    ReconcileConfig, RunControl, RunOutcome, RunReport, RunStage,
};
use casewatch_store::runs::{self, RunState};
use casewatch_store::snapshot::{head_version_id, load_canonical};
use casewatch_store::{changelog, db};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Mutex;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Connection, ReconcileConfig) {
    let temp_dir = TempDir::new().unwrap();
    let conn = db::open_store(temp_dir.path().join("store.db")).unwrap();
    let config = ReconcileConfig {
        artifact_dir: temp_dir.path().join("artifacts"),
        ..ReconcileConfig::default()
    };
    (temp_dir, conn, config)
}

fn run1_input() -> Vec<Value> {
    vec![
        json!({"numero": "A", "categorie": "en-cours", "statut": "en cours"}),
        json!({"numero": "Z", "categorie": "expirants", "statut": "expire bientot"}),
    ]
}

fn run2_input() -> Vec<Value> {
    vec![
        json!({"numero": "A", "categorie": "en-cours", "statut": "en instruction"}),
        json!({"numero": "B", "categorie": "en-cours", "statut": "nouveau"}),
        json!({"numero": "Z", "categorie": "expirants", "statut": "expire bientot"}),
    ]
}

fn completed(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

fn run(conn: &mut Connection, input: Vec<Value>, config: &ReconcileConfig) -> RunReport {
    completed(reconcile(conn, input, config, &RunControl::new(), &NoopSink).unwrap())
}

fn inject_head_failure(conn: &Connection) {
    conn.execute_batch(
        "CREATE TRIGGER fail_head BEFORE UPDATE ON canonical_head
         BEGIN SELECT RAISE(ABORT, 'injected head failure'); END;",
    )
    .unwrap();
}

fn clear_head_failure(conn: &Connection) {
    conn.execute_batch("DROP TRIGGER fail_head;").unwrap();
}

fn artifact_names(config: &ReconcileConfig) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(&config.artifact_dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Sink that records deliveries, optionally rejecting them
#[derive(Default)]
struct RecordingSink {
    reject: bool,
    deliveries: Mutex<Vec<(String, usize)>>,
}

impl ChangeSink for RecordingSink {
    fn deliver(&self, delivery: &Delivery<'_>) -> Result<(), ExError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((delivery.run_id.to_string(), delivery.events.len()));
        if self.reject {
            return Err(ExError::new(ExErrorKind::ExternalService)
                .with_op("deliver")
                .with_message("notifier unreachable"));
        }
        Ok(())
    }
}

#[test]
fn test_first_run_reports_everything_as_new() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    let report = run(&mut conn, run1_input(), &config);

    assert_eq!(
        report.events,
        vec![
            ChangeEvent::New {
                id: "A".into(),
                status: "en cours".into(),
                category: "en-cours".into(),
            },
            ChangeEvent::ExpiringAdded {
                id: "Z".into(),
                category: "expirants".into(),
            },
        ]
    );
    assert_eq!(report.counts.main, 1);
    assert_eq!(report.counts.excluded, 1);

    let canonical = load_canonical(&conn).unwrap();
    assert_eq!(canonical.version_id, Some(report.version_id));
    assert!(canonical.main.contains("A"));
    assert!(canonical.excluded.contains("Z"));
}

#[test]
fn test_two_run_scenario() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    run(&mut conn, run1_input(), &config);
    let second = run(&mut conn, run2_input(), &config);

    assert_eq!(
        second.events,
        vec![
            ChangeEvent::New {
                id: "B".into(),
                status: "nouveau".into(),
                category: "en-cours".into(),
            },
            ChangeEvent::Modified {
                id: "A".into(),
                old_status: "en cours".into(),
                new_status: "en instruction".into(),
                old_category: "en-cours".into(),
                new_category: "en-cours".into(),
            },
        ],
        "Z was already known in the excluded category"
    );
    assert_eq!(second.summary.new, 1);
    assert_eq!(second.summary.modified, 1);

    let third = run(
        &mut conn,
        vec![json!({"numero": "B", "categorie": "en-cours", "statut": "nouveau"})],
        &config,
    );
    assert_eq!(
        third.events,
        vec![ChangeEvent::Deleted {
            id: "A".into(),
            status: "en instruction".into(),
            category: "en-cours".into(),
        }]
    );

    let logged = changelog::run_events(&conn, &second.run_id).unwrap();
    assert_eq!(logged, second.events);
}

#[test]
fn test_artifact_is_published_with_run_events() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    run(&mut conn, run1_input(), &config);
    let report = run(&mut conn, run2_input(), &config);

    let path = report.artifact_path.clone().expect("artifact path");
    assert_eq!(path, config.artifact_dir.join(format!("{}.json", report.run_id)));

    let entries: Vec<Value> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        entries,
        vec![
            json!({
                "numero": "B",
                "type": "nouveau",
                "nouveau_statut": "nouveau",
                "nouvelle_categorie": "en-cours"
            }),
            json!({
                "numero": "A",
                "type": "modifie",
                "ancien_statut": "en cours",
                "nouveau_statut": "en instruction",
                "ancienne_categorie": "en-cours",
                "nouvelle_categorie": "en-cours"
            }),
        ]
    );

    let row = runs::get_run(&conn, &report.run_id).unwrap().unwrap();
    assert_eq!(row.state, RunState::Completed);
    assert_eq!(row.event_count, 2);
    assert_eq!(row.artifact_path.as_deref(), path.to_str());
    assert!(row.artifact_digest.is_some());

    let leftovers: Vec<_> = std::fs::read_dir(&config.artifact_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "No temp files left behind");
}

#[test]
fn test_unchanged_input_produces_no_events_and_no_artifact() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    let first = run(&mut conn, run1_input(), &config);
    let second = run(&mut conn, run1_input(), &config);

    assert!(second.events.is_empty());
    assert!(second.summary.is_empty());
    assert!(second.artifact_path.is_none());
    assert!(!config
        .artifact_dir
        .join(format!("{}.json", second.run_id))
        .exists());

    // The new version still becomes canonical; the old one is collected
    assert_eq!(head_version_id(&conn).unwrap(), Some(second.version_id));
    assert_ne!(first.version_id, second.version_id);
}

#[test]
fn test_skipped_and_duplicate_records_are_reported() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    let report = run(
        &mut conn,
        vec![
            json!({"numero": "A", "categorie": "en-cours", "statut": "first"}),
            json!({"numero": "A", "categorie": "en-cours", "statut": "second"}),
            json!({"numero": "", "categorie": "en-cours", "statut": "x"}),
            json!("not an object"),
        ],
        &config,
    );

    assert_eq!(report.counts.input, 4);
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.duplicates.get("A"), Some(&2));
    assert_eq!(
        report.events,
        vec![ChangeEvent::New {
            id: "A".into(),
            status: "first".into(),
            category: "en-cours".into(),
        }],
        "First occurrence wins"
    );
}

#[test]
fn test_cancelled_run_aborts_without_touching_canonical() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let first = run(&mut conn, run1_input(), &config);

    let control = RunControl::new();
    control.cancel();
    let outcome = reconcile(&mut conn, run2_input(), &config, &control, &NoopSink).unwrap();

    let RunOutcome::Aborted {
        run_id,
        stage,
        reason,
    } = outcome
    else {
        panic!("expected an aborted run");
    };
    assert_eq!(stage, RunStage::Staging);
    assert_eq!(reason.kind(), ExErrorKind::Cancelled);

    assert_eq!(head_version_id(&conn).unwrap(), Some(first.version_id));
    assert!(changelog::run_events(&conn, &run_id).unwrap().is_empty());

    let row = runs::get_run(&conn, &run_id).unwrap().unwrap();
    assert_eq!(row.state, RunState::Aborted);
    assert!(row.detail.unwrap().contains("ERR_CANCELLED"));

    // The next run diffs against the untouched canonical state
    let retry = run(&mut conn, run2_input(), &config);
    assert_eq!(retry.summary.new, 1);
    assert_eq!(retry.summary.modified, 1);
}

#[test]
fn test_expired_deadline_aborts_run() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    let control = RunControl::new().with_deadline(std::time::Instant::now());
    let outcome = reconcile(&mut conn, run1_input(), &config, &control, &NoopSink).unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(head_version_id(&conn).unwrap(), None);
}

fn staged_version_ids(conn: &Connection) -> Vec<i64> {
    let mut stmt = conn
        .prepare("SELECT id FROM snapshot_versions ORDER BY id")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .map(|id| id.unwrap())
        .collect()
}

#[test]
fn test_log_write_failure_aborts_at_logging() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let first = run(&mut conn, run1_input(), &config);
    conn.execute_batch(
        "CREATE TRIGGER fail_log BEFORE INSERT ON change_events
         BEGIN SELECT RAISE(ABORT, 'injected log failure'); END;",
    )
    .unwrap();

    let outcome = reconcile(&mut conn, run2_input(), &config, &RunControl::new(), &NoopSink).unwrap();

    let RunOutcome::Aborted { run_id, stage, .. } = outcome else {
        panic!("expected an aborted run");
    };
    assert_eq!(stage, RunStage::Logging);
    assert_eq!(head_version_id(&conn).unwrap(), Some(first.version_id));
    assert_eq!(staged_version_ids(&conn), vec![first.version_id]);
    assert!(changelog::run_events(&conn, &run_id).unwrap().is_empty());
    assert_eq!(
        runs::get_run(&conn, &run_id).unwrap().unwrap().state,
        RunState::Aborted
    );
    assert_eq!(artifact_names(&config), vec![format!("{}.json", first.run_id)]);
}

#[test]
fn test_aborted_run_withdraws_its_artifact() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    conn.execute_batch(
        "CREATE TRIGGER fail_artifact BEFORE UPDATE OF artifact_path ON runs
         BEGIN SELECT RAISE(ABORT, 'injected artifact failure'); END;",
    )
    .unwrap();

    let outcome = reconcile(&mut conn, run1_input(), &config, &RunControl::new(), &NoopSink).unwrap();

    let RunOutcome::Aborted { run_id, stage, .. } = outcome else {
        panic!("expected an aborted run");
    };
    assert_eq!(stage, RunStage::Logging);
    assert_eq!(head_version_id(&conn).unwrap(), None);
    assert!(artifact_names(&config).is_empty());
    let row = runs::get_run(&conn, &run_id).unwrap().unwrap();
    assert_eq!(row.state, RunState::Aborted);
    assert!(row.artifact_path.is_none());

    // The retry is the only run with a published change set
    conn.execute_batch("DROP TRIGGER fail_artifact;").unwrap();
    let retry = run(&mut conn, run1_input(), &config);
    assert_eq!(retry.summary.new, 1);
    assert_eq!(artifact_names(&config), vec![format!("{}.json", retry.run_id)]);
}

#[test]
fn test_promotion_failure_blocks_until_resumed() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let first = run(&mut conn, run1_input(), &config);

    inject_head_failure(&conn);
    let outcome = reconcile(&mut conn, run2_input(), &config, &RunControl::new(), &NoopSink).unwrap();
    assert_eq!(outcome.exit_code(), 2);
    let RunOutcome::FatalPromotionFailure {
        run_id: failed_run,
        version_id,
        reason,
    } = outcome
    else {
        panic!("expected a fatal promotion failure");
    };
    assert_eq!(reason.kind(), ExErrorKind::PromotionFailed);
    let cause = reason.source_error().expect("promotion cause");
    assert!(cause.message().contains("injected head failure"));
    assert_eq!(head_version_id(&conn).unwrap(), Some(first.version_id));
    assert_eq!(
        runs::get_run(&conn, &failed_run).unwrap().unwrap().state,
        RunState::PromotionFailed
    );

    // Events were logged before promotion was attempted
    assert_eq!(changelog::run_events(&conn, &failed_run).unwrap().len(), 2);

    let blocked = reconcile(&mut conn, run2_input(), &config, &RunControl::new(), &NoopSink)
        .unwrap_err();
    assert_eq!(blocked.kind(), ExErrorKind::PromotionBlocked);
    assert_eq!(blocked.run_id(), Some(&failed_run));

    clear_head_failure(&conn);
    let sink = RecordingSink::default();
    let resumed = completed(resume_promotion(&mut conn, &sink).unwrap());

    assert_eq!(resumed.run_id, failed_run);
    assert_eq!(resumed.version_id, version_id);
    assert_eq!(resumed.events.len(), 2);
    assert_eq!(head_version_id(&conn).unwrap(), Some(version_id));
    assert_eq!(
        sink.deliveries.lock().unwrap().as_slice(),
        &[(failed_run.to_string(), 2)]
    );

    // Unblocked: the next run sees the promoted state
    let next = run(&mut conn, run2_input(), &config);
    assert!(next.events.is_empty());
}

#[test]
fn test_abandoned_promotion_keeps_canonical_and_log() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let first = run(&mut conn, run1_input(), &config);

    inject_head_failure(&conn);
    let outcome = reconcile(&mut conn, run2_input(), &config, &RunControl::new(), &NoopSink).unwrap();
    let failed_run = outcome.run_id().clone();
    clear_head_failure(&conn);

    let (abandoned, state) = abandon_promotion(&conn).unwrap();
    assert_eq!(abandoned, failed_run);
    assert_eq!(state, RunState::Abandoned);
    assert_eq!(head_version_id(&conn).unwrap(), Some(first.version_id));
    assert_eq!(changelog::run_events(&conn, &failed_run).unwrap().len(), 2);
    assert_eq!(artifact_names(&config), vec![format!("{}.json", first.run_id)]);

    // Same changes are reported again by the next run
    let next = run(&mut conn, run2_input(), &config);
    assert_eq!(next.summary.new, 1);
    assert_eq!(next.summary.modified, 1);
}

#[test]
fn test_resolving_without_pending_promotion_is_not_found() {
    let (_temp_dir, mut conn, _config) = setup_test_env();

    let err = resume_promotion(&mut conn, &NoopSink).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);

    let err = abandon_promotion(&conn).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_interrupted_run_is_recovered() {
    let (_temp_dir, mut conn, config) = setup_test_env();

    let stale = casewatch_core_types::RunId::new();
    runs::create_run(&conn, &stale, "diffing").unwrap();

    let report = run(&mut conn, run1_input(), &config);
    assert_eq!(report.summary.new, 1);

    let row = runs::get_run(&conn, &stale).unwrap().unwrap();
    assert_eq!(row.state, RunState::Aborted);
}

#[test]
fn test_sink_failure_keeps_run_completed() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let sink = RecordingSink {
        reject: true,
        ..RecordingSink::default()
    };

    let report = completed(
        reconcile(&mut conn, run1_input(), &config, &RunControl::new(), &sink).unwrap(),
    );

    let delivery_error = report.delivery_error.expect("delivery error");
    assert_eq!(delivery_error.kind(), ExErrorKind::ExternalService);
    assert_eq!(head_version_id(&conn).unwrap(), Some(report.version_id));

    let row = runs::get_run(&conn, &report.run_id).unwrap().unwrap();
    assert_eq!(row.state, RunState::Completed);
    assert!(row.detail.unwrap().contains("notifier unreachable"));
}

#[test]
fn test_sink_receives_promoted_change_set() {
    let (_temp_dir, mut conn, config) = setup_test_env();
    let sink = RecordingSink::default();

    let report = completed(
        reconcile(&mut conn, run1_input(), &config, &RunControl::new(), &sink).unwrap(),
    );

    assert_eq!(
        sink.deliveries.lock().unwrap().as_slice(),
        &[(report.run_id.to_string(), 2)]
    );
}

#[test]
fn test_run_lifecycle_is_logged() {
    let capture = init_test_capture();
    let (_temp_dir, mut conn, config) = setup_test_env();

    let report = run(&mut conn, run1_input(), &config);
    let run_id = report.run_id.to_string();

    let ends: Vec<_> = capture
        .find("reconcile", EVENT_END)
        .into_iter()
        .filter(|e| e.field(FIELD_RUN_ID) == Some(run_id.as_str()))
        .collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].field("event_count"), Some("2"));
    assert!(ends[0].field(FIELD_DURATION_MS).is_some());

    let control = RunControl::new();
    control.cancel();
    let aborted = reconcile(&mut conn, run1_input(), &config, &control, &NoopSink).unwrap();
    let aborted_id = aborted.run_id().to_string();

    let errors: Vec<_> = capture
        .find("reconcile", EVENT_END_ERROR)
        .into_iter()
        .filter(|e| e.field(FIELD_RUN_ID) == Some(aborted_id.as_str()))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_CANCELLED"));
    assert_eq!(errors[0].field(FIELD_STAGE), Some("staging"));
    assert!(errors[0]
        .field(FIELD_ERR_MESSAGE)
        .is_some_and(|m| m.contains("cancelled before staging")));
}
