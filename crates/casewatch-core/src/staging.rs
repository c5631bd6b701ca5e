//! Snapshot staging.
//!
//! Turns one collection run's raw output into a [`StagedSnapshot`]: the main
//! records keyed by id plus the set of ids seen in the excluded category.
//! Staging never looks at the canonical state.
//!
//! ## Rules
//!
//! - Records whose category equals the excluded category go to the excluded
//!   id set only and never into `main`.
//! - Within `main` the first occurrence of an id wins; later duplicates are
//!   dropped and counted in the [`StagingReport`].
//! - A record that fails validation is skipped with its [`SkipReason`]; the
//!   rest of the batch is still staged.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::{RawRecord, Record, SkipReason, Snapshot};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Default name of the excluded category
pub const DEFAULT_EXCLUDED_CATEGORY: &str = "expirants";

/// A record rejected during validation, with its position in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: SkipReason,
}

/// What staging did with its input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Number of input elements seen
    pub total: usize,
    /// Records that passed validation (before deduplication)
    pub accepted: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Main-set ids seen more than once, with their occurrence count
    pub duplicates: BTreeMap<String, usize>,
}

impl StagingReport {
    /// Number of main records dropped because their id was already staged
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates.values().map(|count| count - 1).sum()
    }
}

/// The output of staging, independent of the canonical state until promotion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedSnapshot {
    pub main: Snapshot,
    pub excluded: BTreeSet<String>,
    pub report: StagingReport,
}

/// Stage already-validated records
pub fn stage<I>(records: I, excluded_category: &str) -> StagedSnapshot
where
    I: IntoIterator<Item = Record>,
{
    stage_results(records.into_iter().map(Ok), excluded_category)
}

/// Validate and stage collector records
pub fn stage_raw<I>(raw_records: I, excluded_category: &str) -> StagedSnapshot
where
    I: IntoIterator<Item = RawRecord>,
{
    stage_results(
        raw_records.into_iter().map(RawRecord::validate),
        excluded_category,
    )
}

/// Decode, validate and stage the elements of a collector JSON array
///
/// Elements that are not objects of the expected shape are skipped as
/// `Malformed`.
pub fn stage_values<I>(values: I, excluded_category: &str) -> StagedSnapshot
where
    I: IntoIterator<Item = Value>,
{
    stage_results(
        values
            .into_iter()
            .map(|value| RawRecord::from_value(value).and_then(RawRecord::validate)),
        excluded_category,
    )
}

/// Parse collector output bytes into its array elements
///
/// # Errors
///
/// - `InvalidInput`: the input is not JSON or its root is not an array
pub fn parse_input(bytes: &[u8]) -> Result<Vec<Value>> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| {
        ExError::new(ExErrorKind::InvalidInput)
            .with_op("parse_input")
            .with_message(format!("collector output is not valid JSON: {}", e))
    })?;

    match root {
        Value::Array(items) => Ok(items),
        other => Err(ExError::new(ExErrorKind::InvalidInput)
            .with_op("parse_input")
            .with_message(format!(
                "collector output must be a JSON array, got {}",
                json_type_name(&other)
            ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn stage_results<I>(results: I, excluded_category: &str) -> StagedSnapshot
where
    I: Iterator<Item = std::result::Result<Record, SkipReason>>,
{
    let mut staged = StagedSnapshot::default();
    let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();

    for (index, result) in results.enumerate() {
        staged.report.total += 1;

        let record = match result {
            Ok(record) => record,
            Err(reason) => {
                tracing::debug!(index, %reason, "skipping collector record");
                staged.report.skipped.push(SkippedRecord { index, reason });
                continue;
            }
        };
        staged.report.accepted += 1;

        if record.category == excluded_category {
            staged.excluded.insert(record.id);
            continue;
        }

        *occurrences.entry(record.id.clone()).or_insert(0) += 1;
        staged.main.insert_first(record);
    }

    staged.report.duplicates = occurrences
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .collect();

    staged
}
