//! Canonical region constructors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constraint::{dot, LinearConstraint};
use crate::error::SafetyError;
use crate::polytope::SafetyPolytope;

/// Approximate the ball `|x − center| ≤ radius` with `n_constraints` random
/// supporting hyperplanes.
///
/// Normals are unit vectors drawn from a seeded Gaussian, so the same seed
/// always yields the same region. Offsets are `a·c + r`, making every
/// hyperplane tangent to the ball. Steering renormalizes onto the unit sphere.
pub fn sphere_approximation(
    dimension: usize,
    n_constraints: usize,
    center: &[f32],
    radius: f64,
    margin: f64,
    seed: u64,
) -> Result<SafetyPolytope, SafetyError> {
    if center.len() != dimension {
        return Err(SafetyError::DimensionMismatch {
            expected: dimension,
            actual: center.len(),
        });
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(SafetyError::InvalidRegion(format!(
            "radius {radius} must be positive"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut constraints = Vec::with_capacity(n_constraints);
    for i in 0..n_constraints {
        let normal = random_unit_vector(&mut rng, dimension);
        let offset = dot(&normal, center) + radius;
        constraints.push(LinearConstraint::new(normal, offset, format!("sphere_{i}")));
    }

    Ok(SafetyPolytope::new(dimension, constraints, margin)?.with_renormalization(true))
}

/// Axis-aligned box `lower ≤ x ≤ upper`, two constraints per axis.
pub fn axis_aligned_box(
    lower: &[f64],
    upper: &[f64],
    margin: f64,
) -> Result<SafetyPolytope, SafetyError> {
    if lower.len() != upper.len() {
        return Err(SafetyError::DimensionMismatch {
            expected: lower.len(),
            actual: upper.len(),
        });
    }
    let dimension = lower.len();
    let mut constraints = Vec::with_capacity(dimension * 2);
    for (axis, (lo, hi)) in lower.iter().zip(upper).enumerate() {
        if lo > hi {
            return Err(SafetyError::InvalidRegion(format!(
                "axis {axis}: lower bound {lo} above upper bound {hi}"
            )));
        }
        let mut up = vec![0.0; dimension];
        up[axis] = 1.0;
        constraints.push(LinearConstraint::new(up, *hi, format!("x{axis}_max")));

        let mut down = vec![0.0; dimension];
        down[axis] = -1.0;
        constraints.push(LinearConstraint::new(down, -lo, format!("x{axis}_min")));
    }
    SafetyPolytope::new(dimension, constraints, margin)
}

fn random_unit_vector(rng: &mut StdRng, dimension: usize) -> Vec<f64> {
    loop {
        let v: Vec<f64> = (0..dimension).map(|_| standard_normal(rng)).collect();
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            return v.into_iter().map(|x| x / norm).collect();
        }
    }
}

/// Box-Muller.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
