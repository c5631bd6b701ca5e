//! Human-readable summary renderer for change sets.

use crate::diff::model::DiffSummary;
use crate::model::ChangeEvent;

/// Render a plain-text summary of a change set, one section per kind
///
/// Informational only; the structured events remain the source of truth.
pub fn render_change_summary(events: &[ChangeEvent]) -> String {
    let summary = DiffSummary::from_events(events);
    let mut out = String::new();

    if summary.is_empty() {
        out.push_str("No changes detected.\n");
        return out;
    }

    out.push_str(&format!(
        "{} change(s): {} new, {} modified, {} deleted, {} expiring added\n",
        summary.total(),
        summary.new,
        summary.modified,
        summary.deleted,
        summary.expiring_added
    ));

    let mut section = |title: &str, lines: Vec<String>| {
        if lines.is_empty() {
            return;
        }
        out.push_str(&format!("\n{} ({})\n", title, lines.len()));
        for line in lines {
            out.push_str("  - ");
            out.push_str(&line);
            out.push('\n');
        }
    };

    section(
        "New",
        events
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::New {
                    id,
                    status,
                    category,
                } => Some(format!("{}: {} [{}]", id, display(status), category)),
                _ => None,
            })
            .collect(),
    );

    section(
        "Modified",
        events
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::Modified {
                    id,
                    old_status,
                    new_status,
                    old_category,
                    new_category,
                } => {
                    let mut line = format!("{}: {} -> {}", id, display(old_status), display(new_status));
                    if old_category != new_category {
                        line.push_str(&format!(" [{} -> {}]", old_category, new_category));
                    }
                    Some(line)
                }
                _ => None,
            })
            .collect(),
    );

    section(
        "Deleted",
        events
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::Deleted {
                    id,
                    status,
                    category,
                } => Some(format!("{}: {} [{}]", id, display(status), category)),
                _ => None,
            })
            .collect(),
    );

    section(
        "Expiring added",
        events
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::ExpiringAdded { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect(),
    );

    out
}

fn display(status: &str) -> &str {
    if status.is_empty() {
        "(no status)"
    } else {
        status
    }
}
