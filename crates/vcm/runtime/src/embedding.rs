//! Boundary to the text embedding model
//!
//! The substrate only needs `text -> vector` of a known dimension.
//! [`HashingEmbedder`] stands in for a real model in tests and demos.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vcm_types::Dimension;

use crate::error::{Result, RuntimeError};

/// Named embedding configuration: model, dimension and expected latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingTier {
    /// Fast, 384 dimensions
    Small,
    /// Balanced, 768 dimensions
    Medium,
    /// Accurate, 1536 dimensions
    Large,
}

impl EmbeddingTier {
    pub const ALL: [EmbeddingTier; 3] = [
        EmbeddingTier::Small,
        EmbeddingTier::Medium,
        EmbeddingTier::Large,
    ];

    pub fn dimension(self) -> Dimension {
        match self {
            EmbeddingTier::Small => Dimension::D384,
            EmbeddingTier::Medium => Dimension::D768,
            EmbeddingTier::Large => Dimension::D1536,
        }
    }

    /// Reference model for the tier.
    pub fn default_model(self) -> &'static str {
        match self {
            EmbeddingTier::Small => "all-MiniLM-L6-v2",
            EmbeddingTier::Medium => "all-mpnet-base-v2",
            EmbeddingTier::Large => "text-embedding-3-small",
        }
    }

    pub fn expected_latency(self) -> Duration {
        match self {
            EmbeddingTier::Small => Duration::from_millis(10),
            EmbeddingTier::Medium => Duration::from_millis(50),
            EmbeddingTier::Large => Duration::from_millis(200),
        }
    }
}

impl fmt::Display for EmbeddingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingTier::Small => write!(f, "small"),
            EmbeddingTier::Medium => write!(f, "medium"),
            EmbeddingTier::Large => write!(f, "large"),
        }
    }
}

/// Text to vector, with a fixed dimension per tier.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn encode(&self, text: &str, tier: EmbeddingTier) -> Result<Vec<f32>>;

    /// Name recorded as the message's semantic space.
    fn model_name(&self, tier: EmbeddingTier) -> String {
        tier.default_model().to_string()
    }
}

/// Deterministic unit-norm vectors seeded from SHA-256 of the text.
///
/// Equal texts give equal vectors; there is no semantic similarity.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn vector(text: &str, tier: EmbeddingTier) -> Vec<f32> {
        let dim = tier.dimension().as_usize();
        let mut out = Vec::with_capacity(dim);
        let mut block: u32 = 0;

        while out.len() < dim {
            let digest = Sha256::new()
                .chain_update(tier.to_string().as_bytes())
                .chain_update([0u8])
                .chain_update(text.as_bytes())
                .chain_update(block.to_le_bytes())
                .finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() == dim {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // map to [-1, 1]
                out.push((raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            block += 1;
        }

        let norm = out.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for x in &mut out {
                *x = (f64::from(*x) / norm) as f32;
            }
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn encode(&self, text: &str, tier: EmbeddingTier) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RuntimeError::Embedding("cannot embed empty text".into()));
        }
        Ok(Self::vector(text, tier))
    }

    fn model_name(&self, tier: EmbeddingTier) -> String {
        format!("hashing-{}", tier.dimension())
    }
}
