use crate::model::record::Record;
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot - the main (non-excluded) records of one capture, keyed by id
///
/// Iteration is ordered by id so every consumer sees the same sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<String, Record>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its id is already present
    ///
    /// Returns `false` when the record was dropped as a duplicate; the first
    /// occurrence of an id always wins.
    pub fn insert_first(&mut self, record: Record) -> bool {
        match self.records.entry(record.id.clone()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in id order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Ids in order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl FromIterator<Record> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert_first(record);
        }
        snapshot
    }
}

/// The currently promoted state: main snapshot plus excluded id set
///
/// `version_id` is the sealed storage version the two halves were read from;
/// `None` means nothing has been promoted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalState {
    pub version_id: Option<i64>,
    pub main: Snapshot,
    pub excluded: BTreeSet<String>,
}

impl CanonicalState {
    /// State of a store that has never completed a run
    pub fn empty() -> Self {
        Self::default()
    }
}
