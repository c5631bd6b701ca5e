//! Promotion of a staged version to canonical.
//!
//! Promotion is a pointer flip: the staged version is sealed and
//! `canonical_head` is pointed at it inside one transaction. Readers that
//! follow the head see either the previous version or the new one in full.

#![allow(clippy::result_large_err)]

use crate::errors::{sqlite_error, Result};
use crate::snapshot::query::head_version_id;
use casewatch_core::errors::{ExError, ExErrorKind};
use rusqlite::{Connection, OptionalExtension};

/// What `promote` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// The head now points at the version; `previous` is the version it replaced
    Promoted { previous: Option<i64> },
    /// The version was already canonical; nothing changed
    AlreadyCanonical,
}

/// Make `version_id` the canonical version
///
/// Promoting the version that is already canonical is a successful no-op.
/// On any failure the transaction rolls back and the previous head stays in
/// place.
///
/// ## Errors
///
/// - `NotFound`: no version with this id exists
/// - `Persistence`: sealing or the head update failed
pub fn promote(conn: &mut Connection, version_id: i64) -> Result<PromotionOutcome> {
    let op = "promote";
    let tx = conn.transaction().map_err(|e| sqlite_error(op, e))?;

    let exists = tx
        .query_row(
            "SELECT 1 FROM snapshot_versions WHERE id = ?1",
            [version_id],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| sqlite_error(op, e))?;
    if exists.is_none() {
        return Err(ExError::new(ExErrorKind::NotFound)
            .with_op(op)
            .with_entity_id(version_id.to_string())
            .with_message("snapshot version not found"));
    }

    let previous = head_version_id(&tx)?;
    if previous == Some(version_id) {
        return Ok(PromotionOutcome::AlreadyCanonical);
    }

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE snapshot_versions SET state = 'sealed', sealed_at = ?2 WHERE id = ?1",
        rusqlite::params![version_id, now],
    )
    .map_err(|e| sqlite_error(op, e))?;

    tx.execute(
        "INSERT INTO canonical_head (singleton, version_id, promoted_at) VALUES (1, ?1, ?2)
         ON CONFLICT(singleton) DO UPDATE SET
            version_id = excluded.version_id,
            promoted_at = excluded.promoted_at",
        rusqlite::params![version_id, now],
    )
    .map_err(|e| {
        ExError::new(ExErrorKind::Persistence)
            .with_op(op)
            .with_entity_id(version_id.to_string())
            .with_message(format!("Failed to move canonical head: {}", e))
    })?;

    tx.commit().map_err(|e| sqlite_error(op, e))?;

    tracing::debug!(version_id, previous = ?previous, "Promoted snapshot version");
    Ok(PromotionOutcome::Promoted { previous })
}

/// Delete versions that can never become canonical again
///
/// Removes sealed versions other than the head, and staged versions left
/// behind by aborted or abandoned runs. Versions staged by a run whose
/// promotion failed are kept so the promotion can be resumed.
///
/// ## Returns
///
/// Number of versions deleted
pub fn gc_versions(conn: &Connection) -> Result<usize> {
    let deleted = conn
        .execute(
            "DELETE FROM snapshot_versions
             WHERE id NOT IN (SELECT version_id FROM canonical_head)
               AND (
                    state = 'sealed'
                 OR run_id IN (SELECT run_id FROM runs WHERE state IN ('aborted', 'abandoned'))
               )",
            [],
        )
        .map_err(|e| sqlite_error("gc_versions", e))?;

    tracing::debug!(deleted, "Collected snapshot versions");
    Ok(deleted)
}
