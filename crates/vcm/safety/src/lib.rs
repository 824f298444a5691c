//! # vcm-safety
//!
//! Geometric safety filter for intent vectors. A [`SafetyPolytope`] is an
//! intersection of half-spaces in embedding space; vectors outside it are
//! either rejected or steered back inside before they are sent.

#![deny(unsafe_code)]

pub mod constraint;
pub mod error;
pub mod factory;
pub mod polytope;

pub use constraint::LinearConstraint;
pub use error::SafetyError;
pub use factory::{axis_aligned_box, sphere_approximation};
pub use polytope::{SafetyPolytope, SteerResult, Violation};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How the safety filter is applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enforce_margin: bool,
    /// Try to correct unsafe vectors instead of rejecting outright
    pub steering_enabled: bool,
    pub max_iterations: usize,
    pub step_size: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enforce_margin: true,
            steering_enabled: true,
            max_iterations: 100,
            step_size: 0.1,
        }
    }
}

/// Result of running a vector through the filter.
#[derive(Clone, Debug, PartialEq)]
pub enum SafetyVerdict {
    /// Already inside the region
    Safe,
    /// Corrected into the region; carries the replacement vector
    Steered { vector: Vec<f32>, iterations: usize },
    /// Outside the region and could not be corrected
    Unsafe { violations: Vec<Violation> },
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, SafetyVerdict::Unsafe { .. })
    }
}

/// A region plus the policy for applying it.
#[derive(Clone, Debug)]
pub struct SafetyFilter {
    region: SafetyPolytope,
    config: SafetyConfig,
}

impl SafetyFilter {
    pub fn new(region: SafetyPolytope, config: SafetyConfig) -> Self {
        Self { region, config }
    }

    pub fn region(&self) -> &SafetyPolytope {
        &self.region
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn evaluate(&self, vector: &[f32]) -> Result<SafetyVerdict, SafetyError> {
        let enforce = self.config.enforce_margin;
        if self.region.is_safe(vector, enforce) {
            return Ok(SafetyVerdict::Safe);
        }

        if self.config.steering_enabled {
            let steered = self.region.steer(
                vector,
                self.config.max_iterations,
                self.config.step_size,
                enforce,
            )?;
            if steered.converged && self.region.is_safe(&steered.vector, enforce) {
                debug!(iterations = steered.iterations, "Unsafe vector steered into region");
                return Ok(SafetyVerdict::Steered {
                    vector: steered.vector,
                    iterations: steered.iterations,
                });
            }
        }

        let violations = self.region.get_violations(vector)?;
        warn!(violations = violations.len(), "Vector outside safety region");
        Ok(SafetyVerdict::Unsafe { violations })
    }
}
