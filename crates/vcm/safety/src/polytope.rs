use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constraint::LinearConstraint;
use crate::error::SafetyError;

/// A violated constraint and how far past its boundary the point sits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub index: usize,
    pub label: String,
    /// `a·x − b`, always positive for a violation
    pub overshoot: f64,
}

/// Outcome of steering.
#[derive(Clone, Debug, PartialEq)]
pub struct SteerResult {
    /// Best-effort vector: inside the region when `converged`
    pub vector: Vec<f32>,
    pub iterations: usize,
    pub converged: bool,
}

/// Convex region `{x : a_i·x − b_i ≤ 0 ∀i}` in embedding space.
///
/// Holds no message state; every method is a pure function of the region and
/// its arguments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyPolytope {
    dimension: usize,
    constraints: Vec<LinearConstraint>,
    /// Threshold applied to `a·x − b` when the margin is enforced
    margin: f64,
    /// Project back onto the unit sphere after every steering step
    renormalize: bool,
}

impl SafetyPolytope {
    pub fn new(
        dimension: usize,
        constraints: Vec<LinearConstraint>,
        margin: f64,
    ) -> Result<Self, SafetyError> {
        if dimension == 0 {
            return Err(SafetyError::InvalidRegion("dimension must be positive".into()));
        }
        if !margin.is_finite() {
            return Err(SafetyError::InvalidRegion(format!("margin {margin} is not finite")));
        }
        for c in &constraints {
            if c.dimension() != dimension {
                return Err(SafetyError::DimensionMismatch {
                    expected: dimension,
                    actual: c.dimension(),
                });
            }
            c.check()?;
        }
        Ok(Self {
            dimension,
            constraints,
            margin,
            renormalize: false,
        })
    }

    /// A region with no constraints: every finite vector is safe.
    pub fn unconstrained(dimension: usize) -> Self {
        Self {
            dimension,
            constraints: Vec::new(),
            margin: 0.0,
            renormalize: false,
        }
    }

    /// Enable or disable unit-length projection during steering.
    pub fn with_renormalization(mut self, renormalize: bool) -> Self {
        self.renormalize = renormalize;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn renormalizes(&self) -> bool {
        self.renormalize
    }

    fn ensure_input(&self, vector: &[f32]) -> Result<(), SafetyError> {
        if vector.len() != self.dimension {
            return Err(SafetyError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
            return Err(SafetyError::NonFiniteVector { index });
        }
        Ok(())
    }

    fn threshold(&self, enforce_margin: bool) -> f64 {
        if enforce_margin {
            self.margin
        } else {
            0.0
        }
    }

    /// True iff every constraint has `a·x − b ≤ threshold`, where the
    /// threshold is the margin when enforced and zero otherwise.
    ///
    /// A vector of the wrong dimension, or one with a NaN or infinite
    /// component, is never safe, even in an unconstrained region.
    pub fn is_safe(&self, vector: &[f32], enforce_margin: bool) -> bool {
        if let Err(e) = self.ensure_input(vector) {
            warn!(error = %e, "Safety check on unusable vector");
            return false;
        }
        let threshold = self.threshold(enforce_margin);
        self.constraints
            .iter()
            .all(|c| c.signed_distance(vector) <= threshold)
    }

    /// Every violated constraint with its overshoot, in constraint order.
    pub fn get_violations(&self, vector: &[f32]) -> Result<Vec<Violation>, SafetyError> {
        self.ensure_input(vector)?;
        Ok(self
            .constraints
            .iter()
            .enumerate()
            .filter_map(|(index, c)| {
                let d = c.signed_distance(vector);
                (d > 0.0).then(|| Violation {
                    index,
                    label: c.label.clone(),
                    overshoot: d,
                })
            })
            .collect())
    }

    fn most_violated(&self, vector: &[f32], threshold: f64) -> Option<(usize, f64)> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.signed_distance(vector) - threshold))
            .filter(|(_, excess)| *excess > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Move a vector toward the region.
    ///
    /// Each iteration finds the single most-violated constraint and steps
    /// `step_size` along its inward unit normal, then re-projects onto the
    /// unit sphere if this region renormalizes. Stops when the vector is safe
    /// (margin enforced as requested) or after `max_iterations`. Never fails
    /// on non-convergence; the best-effort vector is returned with
    /// `converged = false`. Vectors with non-finite components are refused.
    pub fn steer(
        &self,
        vector: &[f32],
        max_iterations: usize,
        step_size: f64,
        enforce_margin: bool,
    ) -> Result<SteerResult, SafetyError> {
        self.ensure_input(vector)?;
        let threshold = self.threshold(enforce_margin);
        let mut current: Vec<f64> = vector.iter().map(|x| f64::from(*x)).collect();
        let as_f32 = |v: &[f64]| v.iter().map(|x| *x as f32).collect::<Vec<f32>>();

        let mut iterations = 0;
        loop {
            let snapshot = as_f32(&current);
            let Some((index, excess)) = self.most_violated(&snapshot, threshold) else {
                if iterations > 0 {
                    debug!(iterations, "Steered vector into safety region");
                }
                return Ok(SteerResult {
                    vector: if iterations == 0 { vector.to_vec() } else { snapshot },
                    iterations,
                    converged: true,
                });
            };
            if iterations >= max_iterations {
                warn!(
                    iterations,
                    constraint = %self.constraints[index].label,
                    excess,
                    "Steering did not converge, returning best effort"
                );
                return Ok(SteerResult {
                    vector: snapshot,
                    iterations,
                    converged: false,
                });
            }

            let c = &self.constraints[index];
            let norm = c.normal_norm();
            for (x, a) in current.iter_mut().zip(&c.normal) {
                *x -= step_size * a / norm;
            }
            if self.renormalize {
                let len = current.iter().map(|x| x * x).sum::<f64>().sqrt();
                if len > 0.0 {
                    current.iter_mut().for_each(|x| *x /= len);
                }
            }
            iterations += 1;
        }
    }

    /// [`steer`](Self::steer) reduced to the resulting vector, margin not enforced.
    pub fn steer_to_safe(
        &self,
        vector: &[f32],
        max_iterations: usize,
        step_size: f64,
    ) -> Result<Vec<f32>, SafetyError> {
        Ok(self.steer(vector, max_iterations, step_size, false)?.vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{axis_aligned_box, sphere_approximation};

    fn unit_box() -> SafetyPolytope {
        axis_aligned_box(&[0.0, 0.0], &[10.0, 10.0], 0.0).unwrap()
    }

    #[test]
    fn box_membership() {
        let b = unit_box();
        assert!(b.is_safe(&[5.0, 5.0], true));
        assert!(!b.is_safe(&[15.0, 5.0], false));

        let violations = b.get_violations(&[15.0, 5.0]).unwrap();
        assert_eq!(violations.len(), 1);
        assert!((violations[0].overshoot - 5.0).abs() < 1e-9);
        assert!(b.get_violations(&[5.0, 5.0]).unwrap().is_empty());
    }

    #[test]
    fn empty_region_is_vacuously_safe() {
        let region = SafetyPolytope::unconstrained(3);
        assert!(region.is_safe(&[1e9, -1e9, 0.0], true));
        assert!(region.get_violations(&[1.0, 2.0, 3.0]).unwrap().is_empty());
    }

    #[test]
    fn non_finite_vectors_are_never_safe() {
        let open = SafetyPolytope::unconstrained(2);
        assert!(!open.is_safe(&[f32::NAN, 0.0], false));
        assert!(matches!(
            open.steer(&[0.0, f32::INFINITY], 10, 0.1, false),
            Err(SafetyError::NonFiniteVector { index: 1 })
        ));

        let bounded = unit_box();
        assert!(!bounded.is_safe(&[f32::NAN, 5.0], true));
        assert!(matches!(
            bounded.steer(&[f32::NAN, 5.0], 10, 1.0, false),
            Err(SafetyError::NonFiniteVector { index: 0 })
        ));
        assert!(bounded.get_violations(&[f32::NAN, 5.0]).is_err());
    }

    #[test]
    fn margin_is_the_enforced_threshold() {
        let tight = axis_aligned_box(&[0.0, 0.0], &[10.0, 10.0], -1.0).unwrap();
        assert!(tight.is_safe(&[9.5, 5.0], false));
        assert!(!tight.is_safe(&[9.5, 5.0], true));
        assert!(tight.is_safe(&[8.5, 5.0], true));

        let loose = axis_aligned_box(&[0.0, 0.0], &[10.0, 10.0], 0.5).unwrap();
        assert!(loose.is_safe(&[10.25, 5.0], true));
        assert!(!loose.is_safe(&[10.25, 5.0], false));
    }

    #[test]
    fn wrong_dimension_is_unsafe() {
        let b = unit_box();
        assert!(!b.is_safe(&[1.0], false));
        assert!(matches!(
            b.get_violations(&[1.0, 2.0, 3.0]),
            Err(SafetyError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn steering_safe_vector_is_identity() {
        let b = unit_box();
        let result = b.steer(&[3.0, 4.0], 10, 1.0, false).unwrap();
        assert_eq!(result.vector, vec![3.0, 4.0]);
        assert_eq!(result.iterations, 0);
        assert!(result.converged);
    }

    #[test]
    fn steering_into_box() {
        let b = unit_box();
        let result = b.steer(&[15.0, 5.0], 20, 1.0, false).unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 5);
        assert!(b.is_safe(&result.vector, false));
    }

    #[test]
    fn non_convergence_returns_best_effort() {
        let b = unit_box();
        let result = b.steer(&[100.0, 5.0], 3, 1.0, false).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
        assert!((result.vector[0] - 97.0).abs() < 1e-5);
        assert_eq!(b.steer_to_safe(&[100.0, 5.0], 3, 1.0).unwrap(), result.vector);
    }

    #[test]
    fn steering_on_the_sphere_stays_unit_length() {
        let region = sphere_approximation(16, 64, &vec![0.0; 16], 0.5, 0.0, 7).unwrap();
        let mut far = vec![0.0f32; 16];
        far[0] = 1.0;
        let result = region.steer(&far, 500, 0.05, false).unwrap();
        let len: f32 = result.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((len - 1.0).abs() < 1e-4);
    }
}
