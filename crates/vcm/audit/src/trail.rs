use tracing::{debug, warn};

use crate::entry::{AuditEntry, GENESIS_HASH};
use crate::error::{AuditError, Result};
use crate::export::AuditExport;
use crate::integrity::{verify_entries, ChainReport};
use crate::metrics::AuditMetrics;

/// Append-only, hash-chained record of enforcement decisions.
///
/// Appending takes `&mut self`: a chain has exactly one writer, which keeps
/// entry positions strictly increasing and gap-free. Share it behind a lock
/// when several tasks log.
#[derive(Debug, Default, Clone)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
    compliant: u64,
    non_compliant: u64,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decision and return the new entry.
    pub fn log_action(
        &mut self,
        agent_id: impl Into<String>,
        action: impl Into<String>,
        compliant: bool,
        metadata: Option<serde_json::Value>,
    ) -> &AuditEntry {
        let previous_hash = self.head_hash().to_string();
        let entry = AuditEntry::new(
            self.entries.len() as u64,
            agent_id.into(),
            action.into(),
            compliant,
            previous_hash,
            metadata,
        );

        if compliant {
            self.compliant += 1;
        } else {
            self.non_compliant += 1;
        }
        debug!(
            entry_id = entry.entry_id,
            agent_id = %entry.agent_id,
            action = %entry.action,
            compliant,
            "Audit entry appended"
        );

        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// `true` when every hash and every link (including genesis) checks out.
    pub fn verify_chain_integrity(&self) -> bool {
        self.verify_chain().valid
    }

    /// Full diagnostic of every broken entry.
    pub fn verify_chain(&self) -> ChainReport {
        let report = verify_entries(GENESIS_HASH, &self.entries);
        if !report.valid {
            warn!(
                breaks = report.breaks.len(),
                first = ?report.first_break(),
                "Audit chain integrity check failed"
            );
        }
        report
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash the next entry will link to.
    pub fn head_hash(&self) -> &str {
        self.entries
            .last()
            .map(|e| e.current_hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    pub fn get_agent_history(&self, agent_id: &str) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| e.agent_id == agent_id).collect()
    }

    pub fn get_non_compliant_actions(&self) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| !e.compliant).collect()
    }

    pub fn export_metrics(&self) -> AuditMetrics {
        AuditMetrics::from_counts(self.compliant, self.non_compliant, self.entries.len())
    }

    /// Dump the full chain for independent replay.
    pub fn export_chain(&self) -> AuditExport {
        AuditExport::new(GENESIS_HASH, self.entries.clone())
    }

    /// Rebuild a trail from an export. A broken chain is refused rather than
    /// repaired.
    pub fn from_export(export: AuditExport) -> Result<Self> {
        if export.genesis_hash != GENESIS_HASH {
            return Err(AuditError::BrokenChain(format!(
                "unexpected genesis hash {}",
                export.genesis_hash
            )));
        }
        let report = export.verify();
        if let Some(first) = report.first_break() {
            return Err(AuditError::BrokenChain(format!(
                "{} broken entries, first at index {} ({:?})",
                report.breaks.len(),
                first.index,
                first.kind
            )));
        }

        let compliant = export.entries.iter().filter(|e| e.compliant).count() as u64;
        let non_compliant = export.entries.len() as u64 - compliant;
        Ok(Self {
            entries: export.entries,
            compliant,
            non_compliant,
        })
    }
}
