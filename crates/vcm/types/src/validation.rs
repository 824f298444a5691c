use chrono::{DateTime, Utc};

use crate::message::{VectorCommMessage, MAX_PRIORITY, PROTOCOL_VERSION};

/// Fixed frame prefix: magic(4) + version(2) + flags(1) + body_len(4)
const FRAME_OVERHEAD: usize = 11;
/// Header section: len(4) + dimension(4) + encoding(1) + confidence(8) + version(2) + name_len(2)
const HEADER_FIXED: usize = 21;
/// Room reserved for the two JSON metadata sections
const METADATA_ALLOWANCE: usize = 256;
/// present(1) + len(2) + 64 hex chars
const CHECKSUM_ALLOWANCE: usize = 67;

/// Check every structural invariant of a message and report what is broken.
///
/// An empty result means the message is valid.
pub fn validation_errors(message: &VectorCommMessage) -> Vec<String> {
    validation_errors_at(message, Utc::now())
}

/// Same as [`validation_errors`] with an explicit clock.
pub fn validation_errors_at(message: &VectorCommMessage, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();
    let header = &message.header;
    let payload = &message.payload;
    let dim = header.dimension.as_usize();

    if header.protocol_version == 0 || header.protocol_version > PROTOCOL_VERSION {
        errors.push(format!(
            "unsupported protocol version {} (current {})",
            header.protocol_version, PROTOCOL_VERSION
        ));
    }
    if header.semantic_space.trim().is_empty() {
        errors.push("semantic_space must not be empty".into());
    }
    if !header.confidence.is_finite() || !(0.0..=1.0).contains(&header.confidence) {
        errors.push(format!("confidence {} outside [0, 1]", header.confidence));
    }

    if payload.primary_vector.len() != dim {
        errors.push(format!(
            "primary_vector length {} does not match dimension {}",
            payload.primary_vector.len(),
            dim
        ));
    }
    for (i, ctx) in payload.context_vectors.iter().enumerate() {
        if ctx.len() != dim {
            errors.push(format!(
                "context_vectors[{}] length {} does not match dimension {}",
                i,
                ctx.len(),
                dim
            ));
        }
    }
    if let Some(weights) = &payload.attention_weights {
        if weights.len() != payload.context_vectors.len() {
            errors.push(format!(
                "attention_weights length {} does not match {} context vectors",
                weights.len(),
                payload.context_vectors.len()
            ));
        }
    }
    if let Some(uncertainty) = &payload.uncertainty_vector {
        if uncertainty.len() != dim {
            errors.push(format!(
                "uncertainty_vector length {} does not match dimension {}",
                uncertainty.len(),
                dim
            ));
        }
    }

    let meta = &message.metadata;
    if meta.source_agent.as_str().trim().is_empty() {
        errors.push("source_agent is required".into());
    }
    if let Some(dest) = &meta.destination_agent {
        if dest.as_str().trim().is_empty() {
            errors.push("destination_agent must not be empty when present".into());
        }
    }
    if meta.priority > MAX_PRIORITY {
        errors.push(format!(
            "priority {} outside [0, {}]",
            meta.priority, MAX_PRIORITY
        ));
    }
    if message.is_expired_at(now) {
        errors.push("message has expired".into());
    }

    errors
}

/// `true` when the message satisfies every dimension invariant and has not expired.
pub fn validate(message: &VectorCommMessage) -> bool {
    validation_errors(message).is_empty()
}

pub fn validate_at(message: &VectorCommMessage, now: DateTime<Utc>) -> bool {
    validation_errors_at(message, now).is_empty()
}

/// Deterministic estimate of the uncompressed frame size in bytes.
///
/// Counts every vector at the header's encoding width plus fixed allowances
/// for framing, metadata and checksum.
pub fn estimate_size(message: &VectorCommMessage) -> usize {
    let width = message.header.encoding.bytes_per_value();
    let payload = &message.payload;

    let header = HEADER_FIXED + message.header.semantic_space.len();
    let primary = 4 + payload.primary_vector.len() * width;
    let context: usize = 4 + payload
        .context_vectors
        .iter()
        .map(|c| 4 + c.len() * width)
        .sum::<usize>();
    let attention = 1 + payload
        .attention_weights
        .as_ref()
        .map(|w| 4 + w.len() * 4)
        .unwrap_or(0);
    let uncertainty = 1 + payload
        .uncertainty_vector
        .as_ref()
        .map(|u| 4 + u.len() * width)
        .unwrap_or(0);

    FRAME_OVERHEAD
        + header
        + primary
        + context
        + attention
        + uncertainty
        + METADATA_ALLOWANCE
        + CHECKSUM_ALLOWANCE
}
