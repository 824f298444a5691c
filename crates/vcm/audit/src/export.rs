//! Full-chain export for independent replay

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;
use crate::error::Result;
use crate::integrity::{verify_entries, ChainReport};

/// Genesis hash plus every entry: enough to re-verify the chain without the
/// process that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditExport {
    pub genesis_hash: String,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<AuditEntry>,
}

impl AuditExport {
    pub fn new(genesis_hash: impl Into<String>, entries: Vec<AuditEntry>) -> Self {
        Self {
            genesis_hash: genesis_hash.into(),
            exported_at: Utc::now(),
            entries,
        }
    }

    /// Replay integrity verification over the exported entries.
    pub fn verify(&self) -> ChainReport {
        verify_entries(&self.genesis_hash, &self.entries)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
