//! Audit entries and their hashes

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `previous_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One enforcement decision in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 0
    pub entry_id: u64,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action: String,
    pub compliant: bool,
    pub previous_hash: String,
    pub current_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    pub(crate) fn new(
        entry_id: u64,
        agent_id: String,
        action: String,
        compliant: bool,
        previous_hash: String,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let mut entry = Self {
            entry_id,
            timestamp: Utc::now(),
            agent_id,
            action,
            compliant,
            previous_hash,
            current_hash: String::new(),
            metadata,
        };
        entry.current_hash = entry.compute_hash();
        entry
    }

    /// Hex SHA-256 over every field except `current_hash`.
    ///
    /// Each field is length-prefixed, so no content can move across a field
    /// boundary without changing the digest.
    pub fn compute_hash(&self) -> String {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);

        let mut hasher = Sha256::new();
        hasher.update(self.entry_id.to_le_bytes());
        hash_field(&mut hasher, timestamp.as_bytes());
        hash_field(&mut hasher, self.agent_id.as_bytes());
        hash_field(&mut hasher, self.action.as_bytes());
        hasher.update([u8::from(self.compliant)]);
        hash_field(&mut hasher, self.previous_hash.as_bytes());
        match &self.metadata {
            Some(metadata) => {
                hasher.update([1u8]);
                let encoded = serde_json::to_vec(metadata).unwrap_or_default();
                hash_field(&mut hasher, &encoded);
            }
            None => hasher.update([0u8]),
        }
        hex::encode(hasher.finalize())
    }

    /// Stored hash matches the recomputed one.
    pub fn is_intact(&self) -> bool {
        self.compute_hash() == self.current_hash
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
