//! Exported change-set artifact.
//!
//! The artifact is the JSON array handed to downstream collaborators after a
//! run. Field names follow the collector's vocabulary so existing consumers
//! keep reading it unchanged.

use crate::errors::Result;
use crate::model::change::ChangeEvent;
use casewatch_core_types::RunId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One element of the exported artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub numero: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancien_statut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nouveau_statut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancienne_categorie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nouvelle_categorie: Option<String>,
}

impl From<&ChangeEvent> for ArtifactEntry {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            numero: event.id().to_string(),
            kind: event.kind().artifact_type().to_string(),
            ancien_statut: event.old_status().map(str::to_string),
            nouveau_statut: event.new_status().map(str::to_string),
            ancienne_categorie: event.old_category().map(str::to_string),
            nouvelle_categorie: event.new_category().map(str::to_string),
        }
    }
}

/// Serialized change set of one run, ready to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBlob {
    pub run_id: RunId,
    pub bytes: Vec<u8>,
    pub event_count: usize,
    /// Hex SHA-256 of `bytes`
    pub digest: String,
}

impl ArtifactBlob {
    /// Encode a run's events in the order given
    ///
    /// Returns `None` for an empty change set: a run without events produces
    /// no artifact.
    ///
    /// # Errors
    ///
    /// - `Serialization`: JSON encoding failed
    pub fn encode(run_id: &RunId, events: &[ChangeEvent]) -> Result<Option<Self>> {
        if events.is_empty() {
            return Ok(None);
        }

        let entries: Vec<ArtifactEntry> = events.iter().map(ArtifactEntry::from).collect();
        let bytes = serde_json::to_vec_pretty(&entries)?;
        let digest = hex::encode(Sha256::digest(&bytes));

        Ok(Some(Self {
            run_id: run_id.clone(),
            bytes,
            event_count: entries.len(),
            digest,
        }))
    }

    /// Decode the entries back, used by readers of published artifacts
    ///
    /// # Errors
    ///
    /// - `Serialization`: bytes are not an artifact array
    pub fn entries(&self) -> Result<Vec<ArtifactEntry>> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// File name the artifact is published under
    pub fn file_name(&self) -> String {
        format!("{}.json", self.run_id)
    }
}
