//! Reconciliation settings.
//!
//! Read from an optional TOML file; every key is optional and falls back to
//! its default.
//!
//! ```toml
//! excluded_category = "expirants"
//! artifact_dir = ".casewatch/artifacts"
//! lock_timeout_ms = 5000
//! run_timeout_ms = 600000
//! ```

#![allow(clippy::result_large_err)]

use casewatch_core::errors::{ExError, ExErrorKind, Result};
use casewatch_core::staging::DEFAULT_EXCLUDED_CATEGORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default store location, relative to the working directory
pub const DEFAULT_DB_PATH: &str = ".casewatch/store.db";

/// Default artifact directory, relative to the working directory
pub const DEFAULT_ARTIFACT_DIR: &str = ".casewatch/artifacts";

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Settings of a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Category tracked for appearance only, never merged into the canonical set
    pub excluded_category: String,
    /// Where run artifacts are published
    pub artifact_dir: PathBuf,
    /// How long to wait for another run to release the run lock
    pub lock_timeout_ms: u64,
    /// Deadline for a run, checked between stages before promotion
    pub run_timeout_ms: Option<u64>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            excluded_category: DEFAULT_EXCLUDED_CATEGORY.to_string(),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            run_timeout_ms: None,
        }
    }
}

impl ReconcileConfig {
    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: not valid TOML, unknown key, or an invalid value
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("load_config")
                .with_message(format!("invalid configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read settings from a TOML file
    ///
    /// # Errors
    ///
    /// - `Io`: the file could not be read
    /// - `InvalidInput`: see [`ReconcileConfig::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_config")
                .with_entity_id(path.display().to_string())
                .with_message(e.to_string())
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// - `InvalidInput`: the excluded category is blank
    pub fn validate(&self) -> Result<()> {
        if self.excluded_category.trim().is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("load_config")
                .with_message("excluded_category must not be empty"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}
