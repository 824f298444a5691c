//! Chain verification

use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;

/// What is wrong with one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// `previous_hash` does not match the prior entry (or genesis)
    LinkMismatch,
    /// `entry_id` is not the entry's position
    SequenceGap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub index: usize,
    pub entry_id: u64,
    pub kind: BreakKind,
}

/// Full diagnostic for a chain. Verification visits every entry even after
/// the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub total_entries: usize,
    pub breaks: Vec<ChainBreak>,
}

impl ChainReport {
    pub fn first_break(&self) -> Option<&ChainBreak> {
        self.breaks.first()
    }
}

/// Verify `entries` as a chain rooted at `genesis`.
pub fn verify_entries(genesis: &str, entries: &[AuditEntry]) -> ChainReport {
    let mut breaks = Vec::new();
    let mut expected_prev = genesis;

    for (index, entry) in entries.iter().enumerate() {
        if entry.entry_id != index as u64 {
            breaks.push(ChainBreak {
                index,
                entry_id: entry.entry_id,
                kind: BreakKind::SequenceGap,
            });
        }
        if entry.previous_hash != expected_prev {
            breaks.push(ChainBreak {
                index,
                entry_id: entry.entry_id,
                kind: BreakKind::LinkMismatch,
            });
        }
        if !entry.is_intact() {
            breaks.push(ChainBreak {
                index,
                entry_id: entry.entry_id,
                kind: BreakKind::HashMismatch,
            });
        }
        expected_prev = &entry.current_hash;
    }

    ChainReport {
        valid: breaks.is_empty(),
        total_entries: entries.len(),
        breaks,
    }
}
