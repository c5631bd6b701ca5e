//! Excluded-category tracking.
//!
//! Records in the excluded category are never merged into the canonical
//! snapshot; only their first appearance is reported. Disappearance from the
//! excluded listing is not observable.

use crate::model::ChangeEvent;
use std::collections::BTreeSet;

/// Emit one `ExpiringAdded` per id in `current` that is not in `previous`
///
/// Events are ordered by id and carry `category` as their category name.
pub fn track_excluded(
    current: &BTreeSet<String>,
    previous: &BTreeSet<String>,
    category: &str,
) -> Vec<ChangeEvent> {
    current
        .difference(previous)
        .map(|id| ChangeEvent::ExpiringAdded {
            id: id.clone(),
            category: category.to_string(),
        })
        .collect()
}
