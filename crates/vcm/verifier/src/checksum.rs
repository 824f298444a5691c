//! Message checksums.
//!
//! The digest covers a canonical little-endian rendering of the header fields,
//! every vector component (as `f32` bits, independent of wire encoding), and
//! the routing metadata (source, destination, intent). The checksum field
//! itself is excluded.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;
use vcm_types::VectorCommMessage;

use crate::error::VerifierError;

type HmacSha256 = Hmac<Sha256>;

/// Domain separator so message digests never collide with other SHA-256 uses.
const CHECKSUM_DOMAIN: &[u8] = b"vcm-message-v1";

/// Canonical bytes the checksum is computed over.
pub fn canonical_bytes(message: &VectorCommMessage) -> Vec<u8> {
    let header = &message.header;
    let payload = &message.payload;
    let meta = &message.metadata;

    let mut out = Vec::with_capacity(64 + payload.primary_vector.len() * 4);
    out.extend_from_slice(CHECKSUM_DOMAIN);

    out.extend_from_slice(&header.dimension.as_u32().to_le_bytes());
    out.push(header.encoding.tag());
    out.extend_from_slice(&header.confidence.to_le_bytes());
    out.extend_from_slice(&header.protocol_version.to_le_bytes());
    put_str(&mut out, &header.semantic_space);

    put_vector(&mut out, &payload.primary_vector);
    out.extend_from_slice(&(payload.context_vectors.len() as u64).to_le_bytes());
    for ctx in &payload.context_vectors {
        put_vector(&mut out, ctx);
    }
    put_optional_vector(&mut out, payload.attention_weights.as_deref());
    put_optional_vector(&mut out, payload.uncertainty_vector.as_deref());

    put_str(&mut out, meta.source_agent.as_str());
    match &meta.destination_agent {
        Some(dest) => {
            out.push(1);
            put_str(&mut out, dest.as_str());
        }
        None => out.push(0),
    }
    out.push(meta.intent.tag());
    out
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_vector(out: &mut Vec<u8>, v: &[f32]) {
    out.extend_from_slice(&(v.len() as u64).to_le_bytes());
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
}

fn put_optional_vector(out: &mut Vec<u8>, v: Option<&[f32]>) {
    match v {
        Some(v) => {
            out.push(1);
            put_vector(out, v);
        }
        None => out.push(0),
    }
}

/// Hex digest of the message. HMAC-SHA-256 when a key is given, plain SHA-256
/// otherwise.
pub fn calculate_checksum(
    message: &VectorCommMessage,
    key: Option<&[u8]>,
) -> Result<String, VerifierError> {
    let bytes = canonical_bytes(message);
    match key {
        Some(secret) => {
            let mut mac = HmacSha256::new_from_slice(secret)
                .map_err(|e| VerifierError::InvalidKey(e.to_string()))?;
            mac.update(&bytes);
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        None => Ok(hex::encode(Sha256::digest(&bytes))),
    }
}

/// Compute the checksum and store it on the message.
pub fn attach_checksum(
    message: &mut VectorCommMessage,
    key: Option<&[u8]>,
) -> Result<(), VerifierError> {
    let checksum = calculate_checksum(message, key)?;
    debug!(message_id = %message.message_id(), "Attached checksum");
    message.checksum = Some(checksum);
    Ok(())
}

/// Recompute and compare in constant time. A message without a checksum, or
/// with a malformed one, does not verify.
pub fn verify_checksum(message: &VectorCommMessage, key: Option<&[u8]>) -> bool {
    let Some(stored) = message.checksum.as_deref() else {
        return false;
    };
    let Ok(computed) = calculate_checksum(message, key) else {
        return false;
    };
    let (Ok(expected), Ok(actual)) = (hex::decode(stored), hex::decode(&computed)) else {
        return false;
    };
    if expected.len() != actual.len() {
        return false;
    }
    expected.ct_eq(actual.as_slice()).into()
}
