//! Persisted staging of a new snapshot version.

#![allow(clippy::result_large_err)]

use crate::errors::{sqlite_error, Result};
use casewatch_core::errors::{ExError, ExErrorKind};
use casewatch_core::staging::StagedSnapshot;
use casewatch_core_types::RunId;
use rusqlite::Connection;

/// Write a staged snapshot into a new version in `staging` state
///
/// Main records and excluded ids are written in a single transaction, so a
/// failure leaves no partial version behind. Canonical readers are not
/// affected: they only follow `canonical_head`.
///
/// ## Returns
///
/// The new version id
///
/// ## Errors
///
/// - `Persistence`: any insert failed; nothing was written
pub fn stage_snapshot(
    conn: &mut Connection,
    run_id: &RunId,
    staged: &StagedSnapshot,
) -> Result<i64> {
    let op = "stage_snapshot";
    let tx = conn.transaction().map_err(|e| sqlite_error(op, e))?;

    tx.execute(
        "INSERT INTO snapshot_versions (run_id, state, main_count, excluded_count, created_at)
         VALUES (?1, 'staging', ?2, ?3, ?4)",
        rusqlite::params![
            run_id.as_str(),
            staged.main.len() as i64,
            staged.excluded.len() as i64,
            chrono::Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| sqlite_error(op, e))?;
    let version_id = tx.last_insert_rowid();

    {
        let mut insert_record = tx
            .prepare(
                "INSERT INTO snapshot_records (
                    version_id, id, title, link, category, status,
                    requester, created_at, modified_at, page
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .map_err(|e| sqlite_error(op, e))?;

        for record in staged.main.records() {
            insert_record
                .execute(rusqlite::params![
                    version_id,
                    record.id,
                    record.title,
                    record.link,
                    record.category,
                    record.status,
                    record.requester,
                    record.created_at,
                    record.modified_at,
                    record.page,
                ])
                .map_err(|e| {
                    ExError::new(ExErrorKind::Persistence)
                        .with_op(op)
                        .with_entity_id(record.id.clone())
                        .with_run_id(run_id.clone())
                        .with_message(format!("Failed to stage record: {}", e))
                })?;
        }

        let mut insert_excluded = tx
            .prepare("INSERT INTO snapshot_excluded (version_id, id) VALUES (?1, ?2)")
            .map_err(|e| sqlite_error(op, e))?;

        for id in &staged.excluded {
            insert_excluded
                .execute(rusqlite::params![version_id, id])
                .map_err(|e| sqlite_error(op, e))?;
        }
    }

    tx.commit().map_err(|e| sqlite_error(op, e))?;

    tracing::debug!(
        run_id = %run_id,
        version_id,
        main_len = staged.main.len(),
        excluded_len = staged.excluded.len(),
        "Staged snapshot version"
    );

    Ok(version_id)
}

/// Delete a version that never became canonical
///
/// Only versions still in `staging` state are removed; a sealed version or
/// the current head is left alone.
///
/// ## Returns
///
/// `true` when a version was deleted
pub fn discard_version(conn: &Connection, version_id: i64) -> Result<bool> {
    let deleted = conn
        .execute(
            "DELETE FROM snapshot_versions
             WHERE id = ?1
               AND state = 'staging'
               AND id NOT IN (SELECT version_id FROM canonical_head)",
            [version_id],
        )
        .map_err(|e| sqlite_error("discard_version", e))?;

    tracing::debug!(version_id, deleted, "Discarded staged version");
    Ok(deleted > 0)
}
