//! Three-way diff between two main snapshots.

use crate::model::{ChangeEvent, Snapshot};

/// Diff the canonical main snapshot against the staged one
///
/// Full outer join on `id`:
///
/// - staged only → `New`
/// - both, status or category differs → `Modified` with both pairs
/// - canonical only → `Deleted`
/// - both, identical tracked fields → no event
///
/// A record that moved into the excluded category is absent from the staged
/// main snapshot and therefore reported as `Deleted`.
pub fn diff(canonical: &Snapshot, staged: &Snapshot) -> Vec<ChangeEvent> {
    let mut new = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for record in staged.records() {
        match canonical.get(&record.id) {
            None => new.push(ChangeEvent::New {
                id: record.id.clone(),
                status: record.status.clone(),
                category: record.category.clone(),
            }),
            Some(previous) if !previous.same_tracked_state(record) => {
                modified.push(ChangeEvent::Modified {
                    id: record.id.clone(),
                    old_status: previous.status.clone(),
                    new_status: record.status.clone(),
                    old_category: previous.category.clone(),
                    new_category: record.category.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for record in canonical.records() {
        if !staged.contains(&record.id) {
            deleted.push(ChangeEvent::Deleted {
                id: record.id.clone(),
                status: record.status.clone(),
                category: record.category.clone(),
            });
        }
    }

    // Both snapshots iterate in id order, so each group is already sorted.
    new.extend(modified);
    new.extend(deleted);
    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeKind, Record};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn snapshot(records: &[(&str, &str, &str)]) -> Snapshot {
        records
            .iter()
            .map(|(id, category, status)| Record::new(*id, *category, *status))
            .collect()
    }

    #[test]
    fn test_new_modified_deleted_ordering() {
        let canonical = snapshot(&[
            ("A", "en-cours", "en cours"),
            ("C", "en-cours", "x"),
            ("D", "traités", "clos"),
        ]);
        let staged = snapshot(&[
            ("A", "en-cours", "en instruction"),
            ("B", "en-cours", "nouveau"),
            ("C", "en-cours", "x"),
            ("E", "en-cours", ""),
        ]);

        let events = diff(&canonical, &staged);
        let summary: Vec<(ChangeKind, &str)> =
            events.iter().map(|e| (e.kind(), e.id())).collect();
        assert_eq!(
            summary,
            vec![
                (ChangeKind::New, "B"),
                (ChangeKind::New, "E"),
                (ChangeKind::Modified, "A"),
                (ChangeKind::Deleted, "D"),
            ]
        );
    }

    #[test]
    fn test_category_change_is_modified() {
        let canonical = snapshot(&[("A", "en-cours", "x")]);
        let staged = snapshot(&[("A", "traités", "x")]);

        assert_eq!(
            diff(&canonical, &staged),
            vec![ChangeEvent::Modified {
                id: "A".into(),
                old_status: "x".into(),
                new_status: "x".into(),
                old_category: "en-cours".into(),
                new_category: "traités".into(),
            }]
        );
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let canonical = snapshot(&[("A", "en-cours", "En cours")]);
        let staged = snapshot(&[("A", "en-cours", "en cours")]);
        assert_eq!(diff(&canonical, &staged).len(), 1);
    }

    #[test]
    fn test_display_fields_do_not_produce_events() {
        let canonical = snapshot(&[("A", "en-cours", "x")]);
        let mut changed = Record::new("A", "en-cours", "x");
        changed.title = "Nouveau titre".into();
        changed.page = 4;
        let staged: Snapshot = vec![changed].into_iter().collect();
        assert!(diff(&canonical, &staged).is_empty());
    }

    fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
        prop::collection::vec(
            ("[a-e]", prop::sample::select(vec!["en-cours", "traités"]), "[xy]"),
            0..12,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(id, category, status)| Record::new(id, category, status))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_diff_with_itself_is_empty(s in arb_snapshot()) {
            prop_assert!(diff(&s, &s).is_empty());
        }

        #[test]
        fn prop_diff_partitions_ids(c in arb_snapshot(), s in arb_snapshot()) {
            let events = diff(&c, &s);

            let event_ids: Vec<&str> = events.iter().map(|e| e.id()).collect();
            let unique: BTreeSet<&str> = event_ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), event_ids.len());

            let all_ids: BTreeSet<&str> = c.ids().chain(s.ids()).collect();
            for id in all_ids {
                let expected = match (c.get(id), s.get(id)) {
                    (None, Some(_)) => Some(ChangeKind::New),
                    (Some(_), None) => Some(ChangeKind::Deleted),
                    (Some(a), Some(b)) if !a.same_tracked_state(b) => Some(ChangeKind::Modified),
                    _ => None,
                };
                let actual = events.iter().find(|e| e.id() == id).map(|e| e.kind());
                prop_assert_eq!(actual, expected);
            }
        }

        #[test]
        fn prop_events_are_grouped_and_sorted(c in arb_snapshot(), s in arb_snapshot()) {
            let events = diff(&c, &s);
            let keys: Vec<(ChangeKind, &str)> = events.iter().map(|e| (e.kind(), e.id())).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
        }
    }
}
