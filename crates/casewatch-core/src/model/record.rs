use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Record - one administrative case file as observed in one collection run
///
/// `id` is the stable external identifier and the join key across snapshots.
/// The date fields are opaque display strings copied verbatim from the
/// listing; they are never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable external identifier (the case number)
    pub id: String,

    /// Case title as displayed in the listing
    pub title: String,

    /// Absolute link to the case page
    pub link: String,

    /// Listing the record was collected from (e.g. "en-cours", "expirants")
    pub category: String,

    /// Free-form status label
    pub status: String,

    /// Requester identity as displayed
    pub requester: String,

    /// Creation date, display string
    pub created_at: String,

    /// Last modification date, display string
    pub modified_at: String,

    /// Listing page the record was found on (informational only)
    pub page: u32,
}

impl Record {
    /// Create a record with the required fields; display fields start empty
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            link: String::new(),
            category: category.into(),
            status: status.into(),
            requester: String::new(),
            created_at: String::new(),
            modified_at: String::new(),
            page: 0,
        }
    }

    /// Whether `status` and `category` (the tracked fields) match `other`
    pub fn same_tracked_state(&self, other: &Record) -> bool {
        self.status == other.status && self.category == other.category
    }
}

/// Why a collector record was skipped during staging
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("record has no id")]
    MissingId,

    #[error("record {id} has no category")]
    MissingCategory { id: String },

    #[error("record {id} has no status")]
    MissingStatus { id: String },

    #[error("record is not a valid collector object: {message}")]
    Malformed { message: String },
}

impl SkipReason {
    /// The id of the skipped record, when it had one
    pub fn record_id(&self) -> Option<&str> {
        match self {
            SkipReason::MissingCategory { id } | SkipReason::MissingStatus { id } => Some(id),
            SkipReason::MissingId | SkipReason::Malformed { .. } => None,
        }
    }
}

/// Collector output before validation
///
/// Every field is optional so that one bad record never fails the whole
/// batch. The collector's French field names are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "numero", deserialize_with = "id_text")]
    pub id: Option<String>,
    #[serde(default, alias = "titre")]
    pub title: Option<String>,
    #[serde(default, alias = "lien")]
    pub link: Option<String>,
    #[serde(default, alias = "categorie")]
    pub category: Option<String>,
    #[serde(default, alias = "statut")]
    pub status: Option<String>,
    #[serde(default, alias = "demandeur")]
    pub requester: Option<String>,
    #[serde(default, alias = "date_creation")]
    pub created_at: Option<String>,
    #[serde(default, alias = "date_modification")]
    pub modified_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
}

/// Case numbers are text, but some listings emit them as bare integers
fn id_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid type for id: {}",
            other
        ))),
    }
}

/// `page` is informational: anything that is not a page number reads as absent
fn lenient_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let page = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(page)
}

impl RawRecord {
    /// Decode one element of the collector's JSON array
    pub fn from_value(value: serde_json::Value) -> Result<Self, SkipReason> {
        serde_json::from_value(value).map_err(|e| SkipReason::Malformed {
            message: e.to_string(),
        })
    }

    /// Validate into a typed `Record`
    ///
    /// `id` must be present and non-empty, `category` must be present and
    /// non-empty, `status` must be present (an empty label is a valid status).
    pub fn validate(self) -> Result<Record, SkipReason> {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(SkipReason::MissingId),
        };
        let category = match self.category {
            Some(category) if !category.is_empty() => category,
            _ => return Err(SkipReason::MissingCategory { id }),
        };
        let Some(status) = self.status else {
            return Err(SkipReason::MissingStatus { id });
        };

        Ok(Record {
            id,
            title: self.title.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            category,
            status,
            requester: self.requester.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_default(),
            modified_at: self.modified_at.unwrap_or_default(),
            page: self.page.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collector_aliases() {
        let raw = RawRecord::from_value(json!({
            "numero": "21978078",
            "titre": "Titre de séjour",
            "lien": "https://example.org/dossiers/21978078",
            "categorie": "en-cours",
            "statut": "en construction",
            "demandeur": "M. Dupont",
            "date_creation": "12 mars 2025",
            "date_modification": "14 mars 2025",
            "page": 3
        }))
        .unwrap();

        let record = raw.validate().unwrap();
        assert_eq!(record.id, "21978078");
        assert_eq!(record.category, "en-cours");
        assert_eq!(record.status, "en construction");
        assert_eq!(record.requester, "M. Dupont");
        assert_eq!(record.page, 3);
    }

    #[test]
    fn test_missing_id_is_skipped() {
        let raw = RawRecord {
            category: Some("en-cours".into()),
            status: Some("x".into()),
            ..RawRecord::default()
        };
        assert_eq!(raw.validate(), Err(SkipReason::MissingId));

        let blank = RawRecord {
            id: Some(String::new()),
            category: Some("en-cours".into()),
            status: Some("x".into()),
            ..RawRecord::default()
        };
        assert_eq!(blank.validate(), Err(SkipReason::MissingId));
    }

    #[test]
    fn test_missing_category_and_status() {
        let no_category = RawRecord {
            id: Some("A".into()),
            status: Some("x".into()),
            ..RawRecord::default()
        };
        assert_eq!(
            no_category.validate(),
            Err(SkipReason::MissingCategory { id: "A".into() })
        );

        let no_status = RawRecord {
            id: Some("A".into()),
            category: Some("en-cours".into()),
            ..RawRecord::default()
        };
        assert_eq!(
            no_status.validate(),
            Err(SkipReason::MissingStatus { id: "A".into() })
        );
    }

    #[test]
    fn test_empty_status_is_valid() {
        let raw = RawRecord {
            id: Some("A".into()),
            category: Some("traités".into()),
            status: Some(String::new()),
            ..RawRecord::default()
        };
        assert_eq!(raw.validate().unwrap().status, "");
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let err = RawRecord::from_value(json!({"numero": ["A"]})).unwrap_err();
        assert!(matches!(err, SkipReason::Malformed { .. }));
        assert_eq!(err.record_id(), None);

        let err = RawRecord::from_value(json!("A")).unwrap_err();
        assert!(matches!(err, SkipReason::Malformed { .. }));
    }

    #[test]
    fn test_numeric_id_is_read_as_text() {
        let raw = RawRecord::from_value(json!({
            "numero": 21978078,
            "categorie": "en-cours",
            "statut": "x"
        }))
        .unwrap();
        assert_eq!(raw.validate().unwrap().id, "21978078");
    }

    #[test]
    fn test_odd_page_values_do_not_reject_the_record() {
        for (page, expected) in [
            (json!("3"), 3),
            (json!(-1), 0),
            (json!(4_294_967_296u64), 0),
            (json!(2.5), 0),
            (json!("deux"), 0),
            (json!(null), 0),
        ] {
            let raw = RawRecord::from_value(json!({
                "numero": "A",
                "categorie": "en-cours",
                "statut": "x",
                "page": page
            }))
            .unwrap();
            assert_eq!(raw.validate().unwrap().page, expected);
        }
    }
}
