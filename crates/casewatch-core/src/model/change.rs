use crate::errors::{ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Kind of a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
    ExpiringAdded,
}

impl ChangeKind {
    /// Storage label used in the `change_events.kind` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::ExpiringAdded => "expiring_added",
        }
    }

    /// Parse a storage label
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "new" => Some(ChangeKind::New),
            "modified" => Some(ChangeKind::Modified),
            "deleted" => Some(ChangeKind::Deleted),
            "expiring_added" => Some(ChangeKind::ExpiringAdded),
            _ => None,
        }
    }

    /// Label written to the `type` field of the exported artifact
    pub fn artifact_type(&self) -> &'static str {
        match self {
            ChangeKind::New => "nouveau",
            ChangeKind::Modified => "modifie",
            ChangeKind::Deleted => "supprime",
            ChangeKind::ExpiringAdded => "expirant_ajout",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fact describing one record's transition between two runs
///
/// Each variant carries exactly the fields that make sense for it: `New` has
/// no old values, `Deleted` has no new values, `ExpiringAdded` carries only
/// the excluded category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    New {
        id: String,
        status: String,
        category: String,
    },
    Modified {
        id: String,
        old_status: String,
        new_status: String,
        old_category: String,
        new_category: String,
    },
    Deleted {
        id: String,
        status: String,
        category: String,
    },
    ExpiringAdded {
        id: String,
        category: String,
    },
}

impl ChangeEvent {
    /// Record id this event is about
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::New { id, .. }
            | ChangeEvent::Modified { id, .. }
            | ChangeEvent::Deleted { id, .. }
            | ChangeEvent::ExpiringAdded { id, .. } => id,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::New { .. } => ChangeKind::New,
            ChangeEvent::Modified { .. } => ChangeKind::Modified,
            ChangeEvent::Deleted { .. } => ChangeKind::Deleted,
            ChangeEvent::ExpiringAdded { .. } => ChangeKind::ExpiringAdded,
        }
    }

    pub fn old_status(&self) -> Option<&str> {
        match self {
            ChangeEvent::Modified { old_status, .. } => Some(old_status),
            ChangeEvent::Deleted { status, .. } => Some(status),
            ChangeEvent::New { .. } | ChangeEvent::ExpiringAdded { .. } => None,
        }
    }

    pub fn new_status(&self) -> Option<&str> {
        match self {
            ChangeEvent::New { status, .. } => Some(status),
            ChangeEvent::Modified { new_status, .. } => Some(new_status),
            ChangeEvent::Deleted { .. } | ChangeEvent::ExpiringAdded { .. } => None,
        }
    }

    pub fn old_category(&self) -> Option<&str> {
        match self {
            ChangeEvent::Modified { old_category, .. } => Some(old_category),
            ChangeEvent::Deleted { category, .. } => Some(category),
            ChangeEvent::New { .. } | ChangeEvent::ExpiringAdded { .. } => None,
        }
    }

    pub fn new_category(&self) -> Option<&str> {
        match self {
            ChangeEvent::New { category, .. } | ChangeEvent::ExpiringAdded { category, .. } => {
                Some(category)
            }
            ChangeEvent::Modified { new_category, .. } => Some(new_category),
            ChangeEvent::Deleted { .. } => None,
        }
    }

    /// Rebuild an event from its flat stored columns
    ///
    /// # Errors
    ///
    /// - `CorruptChangeLog`: a column required by `kind` is NULL
    pub fn from_columns(
        kind: ChangeKind,
        id: String,
        old_status: Option<String>,
        new_status: Option<String>,
        old_category: Option<String>,
        new_category: Option<String>,
    ) -> Result<Self> {
        let missing = |column: &str| {
            ExError::new(ExErrorKind::CorruptChangeLog)
                .with_op("change_event_from_columns")
                .with_entity_id(id.clone())
                .with_message(format!("{} event has NULL {}", kind, column))
        };

        let event = match kind {
            ChangeKind::New => ChangeEvent::New {
                status: new_status.ok_or_else(|| missing("new_status"))?,
                category: new_category.ok_or_else(|| missing("new_category"))?,
                id,
            },
            ChangeKind::Modified => ChangeEvent::Modified {
                old_status: old_status.ok_or_else(|| missing("old_status"))?,
                new_status: new_status.ok_or_else(|| missing("new_status"))?,
                old_category: old_category.ok_or_else(|| missing("old_category"))?,
                new_category: new_category.ok_or_else(|| missing("new_category"))?,
                id,
            },
            ChangeKind::Deleted => ChangeEvent::Deleted {
                status: old_status.ok_or_else(|| missing("old_status"))?,
                category: old_category.ok_or_else(|| missing("old_category"))?,
                id,
            },
            ChangeKind::ExpiringAdded => ChangeEvent::ExpiringAdded {
                category: new_category.ok_or_else(|| missing("new_category"))?,
                id,
            },
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_follow_kind() {
        let new = ChangeEvent::New {
            id: "B".into(),
            status: "nouveau".into(),
            category: "en-cours".into(),
        };
        assert_eq!(new.old_status(), None);
        assert_eq!(new.new_status(), Some("nouveau"));

        let deleted = ChangeEvent::Deleted {
            id: "A".into(),
            status: "en cours".into(),
            category: "en-cours".into(),
        };
        assert_eq!(deleted.old_category(), Some("en-cours"));
        assert_eq!(deleted.new_category(), None);

        let expiring = ChangeEvent::ExpiringAdded {
            id: "Z".into(),
            category: "expirants".into(),
        };
        assert_eq!(expiring.new_status(), None);
        assert_eq!(expiring.new_category(), Some("expirants"));
        assert_eq!(expiring.kind(), ChangeKind::ExpiringAdded);
    }

    #[test]
    fn test_from_columns_rebuilds_modified() {
        let event = ChangeEvent::from_columns(
            ChangeKind::Modified,
            "A".into(),
            Some("en cours".into()),
            Some("en instruction".into()),
            Some("en-cours".into()),
            Some("en-cours".into()),
        )
        .unwrap();

        assert_eq!(
            event,
            ChangeEvent::Modified {
                id: "A".into(),
                old_status: "en cours".into(),
                new_status: "en instruction".into(),
                old_category: "en-cours".into(),
                new_category: "en-cours".into(),
            }
        );
    }

    #[test]
    fn test_from_columns_rejects_missing_column() {
        let err = ChangeEvent::from_columns(ChangeKind::New, "B".into(), None, None, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::CorruptChangeLog);
        assert_eq!(err.entity_id(), Some("B"));
    }

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in [
            ChangeKind::New,
            ChangeKind::Modified,
            ChangeKind::Deleted,
            ChangeKind::ExpiringAdded,
        ] {
            assert_eq!(ChangeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChangeKind::parse("renamed"), None);
    }
}
