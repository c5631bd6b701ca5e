//! Read-only snapshot queries.
//!
//! Provides the canonical state as seen through `canonical_head`, raw
//! version reads, and aggregate statistics over the canonical records.

#![allow(clippy::result_large_err)]

use crate::errors::{sqlite_error, Result};
use casewatch_core::model::{CanonicalState, Record, Snapshot};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregate view of the canonical state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalStats {
    pub version_id: Option<i64>,
    pub record_count: usize,
    pub excluded_count: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

/// Version the head pointer references, if anything was ever promoted
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
pub fn head_version_id(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT version_id FROM canonical_head WHERE singleton = 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| sqlite_error("head_version_id", e))
}

/// Read the main records and excluded ids of one version
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
pub fn load_version(conn: &Connection, version_id: i64) -> Result<(Snapshot, BTreeSet<String>)> {
    let op = "load_version";

    let mut stmt = conn
        .prepare(
            "SELECT id, title, link, category, status, requester, created_at, modified_at, page
             FROM snapshot_records WHERE version_id = ?1 ORDER BY id",
        )
        .map_err(|e| sqlite_error(op, e))?;
    let main = stmt
        .query_map([version_id], |row| {
            Ok(Record {
                id: row.get(0)?,
                title: row.get(1)?,
                link: row.get(2)?,
                category: row.get(3)?,
                status: row.get(4)?,
                requester: row.get(5)?,
                created_at: row.get(6)?,
                modified_at: row.get(7)?,
                page: row.get(8)?,
            })
        })
        .map_err(|e| sqlite_error(op, e))?
        .collect::<std::result::Result<Snapshot, _>>()
        .map_err(|e| sqlite_error(op, e))?;

    let mut stmt = conn
        .prepare("SELECT id FROM snapshot_excluded WHERE version_id = ?1 ORDER BY id")
        .map_err(|e| sqlite_error(op, e))?;
    let excluded = stmt
        .query_map([version_id], |row| row.get(0))
        .map_err(|e| sqlite_error(op, e))?
        .collect::<std::result::Result<BTreeSet<String>, _>>()
        .map_err(|e| sqlite_error(op, e))?;

    Ok((main, excluded))
}

/// Read the canonical state
///
/// Both halves are read inside one transaction from the version the head
/// references, so they always belong to the same promotion. A store where
/// nothing was promoted yet yields an empty state.
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
pub fn load_canonical(conn: &Connection) -> Result<CanonicalState> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| sqlite_error("load_canonical", e))?;

    let state = match head_version_id(&tx)? {
        None => CanonicalState::empty(),
        Some(version_id) => {
            let (main, excluded) = load_version(&tx, version_id)?;
            CanonicalState {
                version_id: Some(version_id),
                main,
                excluded,
            }
        }
    };

    tx.finish().map_err(|e| sqlite_error("load_canonical", e))?;

    tracing::debug!(
        version_id = ?state.version_id,
        main_len = state.main.len(),
        excluded_len = state.excluded.len(),
        "Loaded canonical state"
    );

    Ok(state)
}

/// Record counts of the canonical version, by status and by category
///
/// # Errors
///
/// - `Persistence`: SQLite read failed
pub fn canonical_stats(conn: &Connection) -> Result<CanonicalStats> {
    let op = "canonical_stats";
    let Some(version_id) = head_version_id(conn)? else {
        return Ok(CanonicalStats::default());
    };

    let group = |column: &str| -> Result<BTreeMap<String, usize>> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM snapshot_records WHERE version_id = ?1 GROUP BY {column}"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| sqlite_error(op, e))?;
        let counts = stmt
            .query_map([version_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(|e| sqlite_error(op, e))?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(|e| sqlite_error(op, e))?;
        Ok(counts)
    };

    let by_status = group("status")?;
    let by_category = group("category")?;

    let excluded_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM snapshot_excluded WHERE version_id = ?1",
            [version_id],
            |row| row.get(0),
        )
        .map_err(|e| sqlite_error(op, e))?;

    Ok(CanonicalStats {
        version_id: Some(version_id),
        record_count: by_status.values().sum(),
        excluded_count: excluded_count as usize,
        by_status,
        by_category,
    })
}
