//! Append-only change log.
//!
//! Events are appended to `change_events` with a per-run sequence number.
//! The table rejects UPDATE and DELETE through triggers, so a committed event
//! can never be rewritten. Exports read a run's events back in sequence order.

#![allow(clippy::result_large_err)]

use crate::errors::{sqlite_error, Result};
use casewatch_core::errors::{ExError, ExErrorKind};
use casewatch_core::model::{ArtifactBlob, ChangeEvent, ChangeKind};
use casewatch_core_types::RunId;
use rusqlite::{Connection, Row};
use serde::Serialize;

/// A change event as stored, with its run and position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedEvent {
    pub run_id: RunId,
    pub seq: i64,
    pub recorded_at: String,
    pub event: ChangeEvent,
}

/// Read-side filter for [`list_events`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub run_id: Option<RunId>,
    pub record_id: Option<String>,
    pub kind: Option<ChangeKind>,
    pub limit: Option<usize>,
}

/// Append events for a run
///
/// Meant to be called inside the caller's transaction so the append commits
/// together with whatever else the caller records. Sequence numbers continue
/// after the run's last stored event.
///
/// ## Returns
///
/// Number of events appended
///
/// ## Errors
///
/// - `Persistence`: an insert failed (the caller's transaction should roll back)
pub fn append(conn: &Connection, run_id: &RunId, events: &[ChangeEvent]) -> Result<usize> {
    let op = "changelog_append";

    let last_seq: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM change_events WHERE run_id = ?1",
            [run_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| sqlite_error(op, e))?;

    let recorded_at = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn
        .prepare(
            "INSERT INTO change_events (
                run_id, seq, kind, record_id,
                old_status, new_status, old_category, new_category, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(|e| sqlite_error(op, e))?;

    for (offset, event) in events.iter().enumerate() {
        stmt.execute(rusqlite::params![
            run_id.as_str(),
            last_seq + 1 + offset as i64,
            event.kind().as_str(),
            event.id(),
            event.old_status(),
            event.new_status(),
            event.old_category(),
            event.new_category(),
            recorded_at,
        ])
        .map_err(|e| {
            ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_entity_id(event.id())
                .with_run_id(run_id.clone())
                .with_message(format!("Failed to append change event: {}", e))
        })?;
    }

    tracing::debug!(run_id = %run_id, event_count = events.len(), "Appended change events");
    Ok(events.len())
}

/// Flat column values of one `change_events` row
struct StoredEvent {
    run_id: String,
    seq: i64,
    kind: String,
    record_id: String,
    old_status: Option<String>,
    new_status: Option<String>,
    old_category: Option<String>,
    new_category: Option<String>,
    recorded_at: String,
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        run_id: row.get(0)?,
        seq: row.get(1)?,
        kind: row.get(2)?,
        record_id: row.get(3)?,
        old_status: row.get(4)?,
        new_status: row.get(5)?,
        old_category: row.get(6)?,
        new_category: row.get(7)?,
        recorded_at: row.get(8)?,
    })
}

fn decode(stored: StoredEvent) -> Result<LoggedEvent> {
    let kind = ChangeKind::parse(&stored.kind).ok_or_else(|| {
        ExError::new(ExErrorKind::CorruptChangeLog)
            .with_op("changelog_decode")
            .with_entity_id(stored.record_id.clone())
            .with_message(format!(
                "unknown event kind {:?} at seq {}",
                stored.kind, stored.seq
            ))
    })?;
    let event = ChangeEvent::from_columns(
        kind,
        stored.record_id,
        stored.old_status,
        stored.new_status,
        stored.old_category,
        stored.new_category,
    )?;
    Ok(LoggedEvent {
        run_id: RunId::from_string(stored.run_id),
        seq: stored.seq,
        recorded_at: stored.recorded_at,
        event,
    })
}

const EVENT_COLUMNS: &str = "run_id, seq, kind, record_id,
    old_status, new_status, old_category, new_category, recorded_at";

/// Query the log, oldest first
///
/// With a `limit`, the most recent matching events are kept.
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
/// - `CorruptChangeLog`: a stored row does not decode to an event
pub fn list_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<LoggedEvent>> {
    let op = "list_events";
    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM change_events WHERE 1 = 1");
    let mut params: Vec<String> = Vec::new();

    if let Some(run_id) = &filter.run_id {
        params.push(run_id.as_str().to_string());
        sql.push_str(&format!(" AND run_id = ?{}", params.len()));
    }
    if let Some(record_id) = &filter.record_id {
        params.push(record_id.clone());
        sql.push_str(&format!(" AND record_id = ?{}", params.len()));
    }
    if let Some(kind) = filter.kind {
        params.push(kind.as_str().to_string());
        sql.push_str(&format!(" AND kind = ?{}", params.len()));
    }
    match filter.limit {
        // Newest N, flipped back to chronological order below
        Some(limit) => sql.push_str(&format!(
            " ORDER BY recorded_at DESC, run_id DESC, seq DESC LIMIT {}",
            limit
        )),
        None => sql.push_str(" ORDER BY recorded_at, run_id, seq"),
    }

    let mut stmt = conn.prepare(&sql).map_err(|e| sqlite_error(op, e))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), row_to_stored)
        .map_err(|e| sqlite_error(op, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sqlite_error(op, e))?;

    let mut events = rows.into_iter().map(decode).collect::<Result<Vec<_>>>()?;
    if filter.limit.is_some() {
        events.reverse();
    }
    Ok(events)
}

/// A run's events in sequence order
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
/// - `CorruptChangeLog`: a stored row does not decode to an event
pub fn run_events(conn: &Connection, run_id: &RunId) -> Result<Vec<ChangeEvent>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM change_events WHERE run_id = ?1 ORDER BY seq"
        ))
        .map_err(|e| sqlite_error("run_events", e))?;
    let rows = stmt
        .query_map([run_id.as_str()], row_to_stored)
        .map_err(|e| sqlite_error("run_events", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sqlite_error("run_events", e))?;

    rows.into_iter()
        .map(|row| decode(row).map(|logged| logged.event))
        .collect()
}

/// Serialize a run's events into its artifact
///
/// Returns `None` when the run logged no events.
///
/// # Errors
///
/// - `Persistence` or `CorruptChangeLog`: reading the log failed
/// - `Serialization`: encoding the artifact failed
pub fn export_run(conn: &Connection, run_id: &RunId) -> Result<Option<ArtifactBlob>> {
    let events = run_events(conn, run_id)?;
    ArtifactBlob::encode(run_id, &events)
}
