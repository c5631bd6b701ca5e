//! Diff output summaries.

use crate::model::{ChangeEvent, ChangeKind};
use serde::{Deserialize, Serialize};

/// Per-kind event counts of a change set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub expiring_added: usize,
}

impl DiffSummary {
    pub fn from_events(events: &[ChangeEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            match event.kind() {
                ChangeKind::New => summary.new += 1,
                ChangeKind::Modified => summary.modified += 1,
                ChangeKind::Deleted => summary.deleted += 1,
                ChangeKind::ExpiringAdded => summary.expiring_added += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.new + self.modified + self.deleted + self.expiring_added
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
