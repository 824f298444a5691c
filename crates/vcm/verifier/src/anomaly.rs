//! Advisory anomaly detection. Anomalies never reject a message on their own.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vcm_types::VectorCommMessage;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub min_confidence: f64,
    pub min_norm: f64,
    pub max_norm: f64,
    /// Spread below which a vector counts as constant-valued
    pub constant_epsilon: f32,
    pub max_frame_bytes: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            min_norm: 1e-6,
            max_norm: 100.0,
            constant_epsilon: 1e-9,
            max_frame_bytes: 1024 * 1024, // 1MB
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    LowConfidence { confidence: f64 },
    NearZeroNorm { vector: String, norm: f64 },
    ExcessiveNorm { vector: String, norm: f64 },
    ConstantVector { vector: String, value: f32 },
    OversizedFrame { bytes: usize, limit: usize },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::LowConfidence { confidence } => write!(f, "low confidence {confidence:.3}"),
            Anomaly::NearZeroNorm { vector, norm } => write!(f, "{vector} norm {norm:.3e} near zero"),
            Anomaly::ExcessiveNorm { vector, norm } => write!(f, "{vector} norm {norm:.3} excessive"),
            Anomaly::ConstantVector { vector, value } => write!(f, "{vector} is constant {value}"),
            Anomaly::OversizedFrame { bytes, limit } => {
                write!(f, "frame of {bytes} bytes exceeds {limit}")
            }
        }
    }
}

/// Flag suspicious properties of a message.
///
/// `frame_len` is the encoded size when the caller has it; otherwise the
/// deterministic size estimate is used.
pub fn detect_anomalies(
    message: &VectorCommMessage,
    frame_len: Option<usize>,
    thresholds: &AnomalyThresholds,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if message.header.confidence < thresholds.min_confidence {
        anomalies.push(Anomaly::LowConfidence {
            confidence: message.header.confidence,
        });
    }

    check_vector("primary_vector", &message.payload.primary_vector, thresholds, &mut anomalies);
    for (i, ctx) in message.payload.context_vectors.iter().enumerate() {
        check_vector(&format!("context_vectors[{i}]"), ctx, thresholds, &mut anomalies);
    }

    let bytes = frame_len.unwrap_or_else(|| vcm_types::estimate_size(message));
    if bytes > thresholds.max_frame_bytes {
        anomalies.push(Anomaly::OversizedFrame {
            bytes,
            limit: thresholds.max_frame_bytes,
        });
    }

    if !anomalies.is_empty() {
        debug!(
            message_id = %message.message_id(),
            count = anomalies.len(),
            "Anomalies detected"
        );
    }
    anomalies
}

fn check_vector(name: &str, v: &[f32], thresholds: &AnomalyThresholds, out: &mut Vec<Anomaly>) {
    if v.is_empty() {
        return;
    }
    let norm = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm < thresholds.min_norm {
        out.push(Anomaly::NearZeroNorm {
            vector: name.to_string(),
            norm,
        });
    } else if norm > thresholds.max_norm {
        out.push(Anomaly::ExcessiveNorm {
            vector: name.to_string(),
            norm,
        });
    }

    let (min, max) = v
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), x| (lo.min(*x), hi.max(*x)));
    // zero vectors are already reported by the norm check
    if v.len() > 1 && norm >= thresholds.min_norm && (max - min) <= thresholds.constant_epsilon {
        out.push(Anomaly::ConstantVector {
            vector: name.to_string(),
            value: v[0],
        });
    }
}
