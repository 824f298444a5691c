use serde::{Deserialize, Serialize};
use tracing::debug;
use vcm_types::VectorCommMessage;

use crate::checksum::verify_checksum;

/// Tolerance on the attention weight sum in strict mode.
pub const ATTENTION_SUM_TOLERANCE: f32 = 0.01;

/// Outcome of [`validate_message`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    /// Strict-only findings reported in non-strict mode
    pub warnings: Vec<String>,
}

/// Validate a message.
///
/// Structural checks (header domains, dimension agreement, attention count,
/// expiry, checksum if present) always produce errors. The numeric hygiene
/// checks (attention sum ≈ 1, uncertainty in [0, 1], no NaN/Inf) are errors
/// in strict mode and warnings otherwise.
pub fn validate_message(
    message: &VectorCommMessage,
    strict: bool,
    key: Option<&[u8]>,
) -> ValidationReport {
    let mut errors = vcm_types::validation_errors(message);
    let mut hygiene = Vec::new();
    let payload = &message.payload;

    if let Some(weights) = &payload.attention_weights {
        if !weights.is_empty() {
            let sum: f32 = weights.iter().sum();
            if (sum - 1.0).abs() > ATTENTION_SUM_TOLERANCE {
                hygiene.push(format!("attention_weights sum to {sum:.4}, expected 1.0"));
            }
        }
    }
    if let Some(uncertainty) = &payload.uncertainty_vector {
        if let Some(i) = uncertainty
            .iter()
            .position(|u| !(0.0..=1.0).contains(u))
        {
            hygiene.push(format!(
                "uncertainty_vector[{i}] = {} outside [0, 1]",
                uncertainty[i]
            ));
        }
    }
    if has_non_finite(&payload.primary_vector) {
        hygiene.push("primary_vector contains NaN or infinite values".into());
    }
    for (i, ctx) in payload.context_vectors.iter().enumerate() {
        if has_non_finite(ctx) {
            hygiene.push(format!("context_vectors[{i}] contains NaN or infinite values"));
        }
    }
    if payload.attention_weights.as_deref().is_some_and(has_non_finite) {
        hygiene.push("attention_weights contain NaN or infinite values".into());
    }

    if message.checksum.is_some() && !verify_checksum(message, key) {
        errors.push("checksum does not match message contents".into());
    }

    let warnings = if strict {
        errors.append(&mut hygiene);
        Vec::new()
    } else {
        hygiene
    };

    debug!(
        message_id = %message.message_id(),
        strict,
        errors = errors.len(),
        warnings = warnings.len(),
        "Validated message"
    );

    ValidationReport {
        ok: errors.is_empty(),
        errors,
        warnings,
    }
}

fn has_non_finite(v: &[f32]) -> bool {
    v.iter().any(|x| !x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::attach_checksum;
    use vcm_types::{Dimension, MessageBuilder};

    fn message() -> VectorCommMessage {
        MessageBuilder::new("a", Dimension::D384)
            .primary_vector(vec![0.05; 384])
            .context_vector(vec![0.1; 384])
            .context_vector(vec![0.2; 384])
            .attention_weights(vec![0.5, 0.5])
            .uncertainty(vec![0.2; 384])
            .build()
            .unwrap()
    }

    #[test]
    fn clean_message_passes_strict() {
        let report = validate_message(&message(), true, None);
        assert!(report.ok, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn attention_sum_is_strict_only() {
        let mut msg = message();
        msg.payload.attention_weights = Some(vec![0.5, 0.6]);

        let strict = validate_message(&msg, true, None);
        assert!(!strict.ok);
        assert!(strict.errors[0].contains("attention_weights"));

        let lenient = validate_message(&msg, false, None);
        assert!(lenient.ok);
        assert_eq!(lenient.warnings.len(), 1);
    }

    #[test]
    fn nan_and_uncertainty_bounds() {
        let mut msg = message();
        msg.payload.primary_vector[3] = f32::NAN;
        if let Some(u) = msg.payload.uncertainty_vector.as_mut() {
            u[0] = 1.5;
        }
        let report = validate_message(&msg, true, None);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn structural_errors_fail_even_when_lenient() {
        let mut msg = message();
        msg.payload.primary_vector.pop();
        assert!(!validate_message(&msg, false, None).ok);
    }

    #[test]
    fn tampered_checksum_is_an_error() {
        let mut msg = message();
        attach_checksum(&mut msg, None).unwrap();
        assert!(validate_message(&msg, true, None).ok);

        msg.payload.context_vectors[0][0] = 0.9;
        let report = validate_message(&msg, false, None);
        assert!(!report.ok);
        assert!(report.errors.iter().any(|e| e.contains("checksum")));
    }
}
