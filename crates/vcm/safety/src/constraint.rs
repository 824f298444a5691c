use serde::{Deserialize, Serialize};

use crate::error::SafetyError;

/// Half-space `{x : a·x ≤ b}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub normal: Vec<f64>,
    pub offset: f64,
    pub label: String,
}

impl LinearConstraint {
    pub fn new(normal: Vec<f64>, offset: f64, label: impl Into<String>) -> Self {
        Self {
            normal,
            offset,
            label: label.into(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.normal.len()
    }

    /// `a·x − b`. Positive means the point is outside the half-space.
    pub fn signed_distance(&self, x: &[f32]) -> f64 {
        dot(&self.normal, x) - self.offset
    }

    pub fn normal_norm(&self) -> f64 {
        self.normal.iter().map(|a| a * a).sum::<f64>().sqrt()
    }

    pub(crate) fn check(&self) -> Result<(), SafetyError> {
        if !self.offset.is_finite() || self.normal.iter().any(|a| !a.is_finite()) {
            return Err(SafetyError::NonFinite {
                label: self.label.clone(),
            });
        }
        if self.normal_norm() == 0.0 {
            return Err(SafetyError::ZeroNormal {
                label: self.label.clone(),
            });
        }
        Ok(())
    }
}

pub(crate) fn dot(a: &[f64], x: &[f32]) -> f64 {
    a.iter().zip(x).map(|(a, x)| a * f64::from(*x)).sum()
}
