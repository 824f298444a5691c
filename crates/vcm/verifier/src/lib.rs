//! # vcm-verifier
//!
//! Integrity and sanity checks for vector messages:
//!
//! - [`checksum`]: SHA-256 (or keyed HMAC-SHA-256) digests over a canonical
//!   byte rendering of the message, compared in constant time
//! - [`validation`]: field domain and dimension checks with an optional strict
//!   mode for numeric hygiene
//! - [`anomaly`]: advisory flags for vectors that look wrong without being invalid

#![deny(unsafe_code)]

pub mod anomaly;
pub mod checksum;
pub mod error;
pub mod validation;

pub use anomaly::{detect_anomalies, Anomaly, AnomalyThresholds};
pub use checksum::{attach_checksum, calculate_checksum, verify_checksum};
pub use error::VerifierError;
pub use validation::{validate_message, ValidationReport};

use serde::{Deserialize, Serialize};
use vcm_types::VectorCommMessage;

/// Verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Fail closed on validation errors; otherwise warn and continue
    pub strict: bool,
    /// Hex or plain-text key for HMAC checksums. Unkeyed SHA-256 when absent.
    pub checksum_key: Option<String>,
    pub anomaly_thresholds: AnomalyThresholds,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            strict: true,
            checksum_key: None,
            anomaly_thresholds: AnomalyThresholds::default(),
        }
    }
}

/// Verifier bound to one configuration.
#[derive(Clone, Debug, Default)]
pub struct MessageVerifier {
    config: VerificationConfig,
}

impl MessageVerifier {
    pub fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn is_strict(&self) -> bool {
        self.config.strict
    }

    fn key(&self) -> Option<&[u8]> {
        self.config.checksum_key.as_deref().map(str::as_bytes)
    }

    pub fn checksum(&self, message: &VectorCommMessage) -> Result<String, VerifierError> {
        calculate_checksum(message, self.key())
    }

    /// Compute and store the checksum on the message.
    pub fn seal(&self, message: &mut VectorCommMessage) -> Result<(), VerifierError> {
        attach_checksum(message, self.key())
    }

    pub fn verify(&self, message: &VectorCommMessage) -> bool {
        verify_checksum(message, self.key())
    }

    pub fn validate(&self, message: &VectorCommMessage) -> ValidationReport {
        validate_message(message, self.config.strict, self.key())
    }

    /// Validation as a `Result`: errors reject in strict mode and are only
    /// logged otherwise.
    pub fn ensure_valid(&self, message: &VectorCommMessage) -> Result<ValidationReport, VerifierError> {
        let report = self.validate(message);
        if report.ok {
            return Ok(report);
        }
        if self.config.strict {
            return Err(VerifierError::Invalid(report.errors));
        }
        tracing::warn!(
            message_id = %message.message_id(),
            errors = ?report.errors,
            "Message failed validation, continuing in non-strict mode"
        );
        Ok(report)
    }

    /// Require a present, matching checksum.
    pub fn ensure_checksum(&self, message: &VectorCommMessage) -> Result<(), VerifierError> {
        if message.checksum.is_none() {
            return Err(VerifierError::MissingChecksum);
        }
        if !self.verify(message) {
            return Err(VerifierError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Anomalies for the message; `frame_len` is the encoded size when known.
    pub fn anomalies(&self, message: &VectorCommMessage, frame_len: Option<usize>) -> Vec<Anomaly> {
        detect_anomalies(message, frame_len, &self.config.anomaly_thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_types::{Dimension, MessageBuilder};

    #[test]
    fn keyed_verifier_rejects_unkeyed_checksum() {
        let mut msg = MessageBuilder::new("a", Dimension::D384)
            .primary_vector(vec![0.05; 384])
            .build()
            .unwrap();
        attach_checksum(&mut msg, None).unwrap();

        let keyed = MessageVerifier::new(VerificationConfig {
            checksum_key: Some("shared-secret".into()),
            ..VerificationConfig::default()
        });
        assert!(!keyed.verify(&msg));

        keyed.seal(&mut msg).unwrap();
        assert!(keyed.verify(&msg));
        assert!(keyed.validate(&msg).ok);
        assert!(keyed.ensure_checksum(&msg).is_ok());
    }

    #[test]
    fn strictness_decides_between_error_and_warning() {
        let mut msg = MessageBuilder::new("a", Dimension::D384)
            .primary_vector(vec![0.05; 384])
            .build()
            .unwrap();
        msg.payload.primary_vector[0] = f32::INFINITY;

        let strict = MessageVerifier::default();
        assert!(matches!(strict.ensure_valid(&msg), Err(VerifierError::Invalid(_))));

        let lenient = MessageVerifier::new(VerificationConfig {
            strict: false,
            ..VerificationConfig::default()
        });
        let report = lenient.ensure_valid(&msg).unwrap();
        assert!(report.ok);
        assert_eq!(report.warnings.len(), 1);

        assert_eq!(lenient.ensure_checksum(&msg), Err(VerifierError::MissingChecksum));
    }
}
