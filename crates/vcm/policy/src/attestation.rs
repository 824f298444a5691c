//! Compliance attestations.
//!
//! [`HashCommitmentProver`] produces a hash commitment over the compliance
//! statement and the private action details. An HMAC binds the statement,
//! the commitment, the nonce and the key id to the prover. It proves that *this prover* vouched for the statement. It is not a
//! zero-knowledge proof: it has no soundness against a dishonest prover and
//! reveals the statement in the clear. Put a real proving system behind
//! [`ComplianceProver`] if those guarantees are needed.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::error::PolicyError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_KEY_ID: &str = "default";

/// Public claim an attestation vouches for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStatement {
    pub policy_id: String,
    pub policy_version: String,
    pub agent_id: String,
    pub action_type: String,
    pub compliant: bool,
    pub violation_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAttestation {
    pub attestation_id: Uuid,
    pub statement: ComplianceStatement,
    pub key_id: String,
    /// hex SHA-256(statement ‖ witness ‖ nonce)
    pub commitment: String,
    /// hex HMAC-SHA-256(key, key_id ‖ statement ‖ commitment ‖ nonce)
    pub binding: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// Produces and checks compliance attestations.
pub trait ComplianceProver: Send + Sync {
    fn prove(
        &self,
        statement: ComplianceStatement,
        witness: &[u8],
    ) -> Result<ComplianceAttestation, PolicyError>;

    fn verify(&self, attestation: &ComplianceAttestation) -> Result<bool, PolicyError>;
}

/// HMAC-bound hash commitments with an in-memory key registry.
pub struct HashCommitmentProver {
    keys: RwLock<HashMap<String, Vec<u8>>>,
    active_key: RwLock<String>,
}

impl HashCommitmentProver {
    /// Start with a freshly generated random key.
    pub fn new() -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_key(DEFAULT_KEY_ID, key)
    }

    pub fn with_key(key_id: impl Into<String>, key: Vec<u8>) -> Self {
        let key_id = key_id.into();
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), key);
        Self {
            keys: RwLock::new(keys),
            active_key: RwLock::new(key_id),
        }
    }

    /// Register a key and make it the one new attestations are bound with.
    /// Earlier keys stay available for verification.
    pub fn register_key(&self, key_id: impl Into<String>, key: Vec<u8>) -> Result<(), PolicyError> {
        let key_id = key_id.into();
        self.keys
            .write()
            .map_err(|_| PolicyError::LockPoisoned)?
            .insert(key_id.clone(), key);
        *self.active_key.write().map_err(|_| PolicyError::LockPoisoned)? = key_id.clone();
        debug!(key_id = %key_id, "Registered attestation key");
        Ok(())
    }

    pub fn revoke_key(&self, key_id: &str) -> Result<bool, PolicyError> {
        Ok(self
            .keys
            .write()
            .map_err(|_| PolicyError::LockPoisoned)?
            .remove(key_id)
            .is_some())
    }

    pub fn active_key_id(&self) -> Result<String, PolicyError> {
        Ok(self
            .active_key
            .read()
            .map_err(|_| PolicyError::LockPoisoned)?
            .clone())
    }

    fn key(&self, key_id: &str) -> Result<Vec<u8>, PolicyError> {
        self.keys
            .read()
            .map_err(|_| PolicyError::LockPoisoned)?
            .get(key_id)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownKey(key_id.to_string()))
    }

    /// Check that `witness` is the value the attestation committed to.
    pub fn open(&self, attestation: &ComplianceAttestation, witness: &[u8]) -> Result<bool, PolicyError> {
        let nonce = hex::decode(&attestation.nonce)
            .map_err(|e| PolicyError::Attestation(format!("nonce: {e}")))?;
        let commitment = commit(&attestation.statement, witness, &nonce)?;
        Ok(ct_eq_hex(&attestation.commitment, &commitment) && self.verify(attestation)?)
    }
}

impl Default for HashCommitmentProver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplianceProver for HashCommitmentProver {
    fn prove(
        &self,
        statement: ComplianceStatement,
        witness: &[u8],
    ) -> Result<ComplianceAttestation, PolicyError> {
        let key_id = self.active_key_id()?;
        let key = self.key(&key_id)?;

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        let commitment = commit(&statement, witness, &nonce)?;
        let nonce = hex::encode(nonce);
        let binding = bind(&key, &key_id, &statement, &commitment, &nonce)?;

        Ok(ComplianceAttestation {
            attestation_id: Uuid::new_v4(),
            statement,
            key_id,
            commitment,
            binding,
            nonce,
            created_at: Utc::now(),
        })
    }

    fn verify(&self, attestation: &ComplianceAttestation) -> Result<bool, PolicyError> {
        let key = self.key(&attestation.key_id)?;
        let expected = bind(
            &key,
            &attestation.key_id,
            &attestation.statement,
            &attestation.commitment,
            &attestation.nonce,
        )?;
        Ok(ct_eq_hex(&attestation.binding, &expected))
    }
}

fn commit(statement: &ComplianceStatement, witness: &[u8], nonce: &[u8]) -> Result<String, PolicyError> {
    let statement_bytes =
        serde_json::to_vec(statement).map_err(|e| PolicyError::Attestation(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&statement_bytes);
    hasher.update(witness);
    hasher.update(nonce);
    Ok(hex::encode(hasher.finalize()))
}

fn bind(
    key: &[u8],
    key_id: &str,
    statement: &ComplianceStatement,
    commitment: &str,
    nonce: &str,
) -> Result<String, PolicyError> {
    let statement_bytes =
        serde_json::to_vec(statement).map_err(|e| PolicyError::Attestation(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| PolicyError::Attestation(format!("invalid key: {e}")))?;
    for field in [
        key_id.as_bytes(),
        statement_bytes.as_slice(),
        commitment.as_bytes(),
        nonce.as_bytes(),
    ] {
        mac.update(&(field.len() as u64).to_le_bytes());
        mac.update(field);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn ct_eq_hex(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
