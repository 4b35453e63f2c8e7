//! Finite-difference derivatives of pose trajectories.
//!
//! The first-derivative operator uses the five-point central stencil in the
//! interior and fourth-order one-sided stencils at the two samples nearest
//! each end, so the result is aligned 1:1 with the input. Shorter series fall
//! back to lower-order stencils. Order `k` applies the operator `k` times.
//!
//! Angular velocity is expressed in the parent frame:
//! `ω = R_0 · J_l(φ) · φ̇` with `φ` the unwrapped rotation vector relative to
//! the first orientation `R_0`. Higher rotational orders differentiate `ω`.

use jaw_tracking_core::{
    DerivativeKind, Real, Trajectory, TrajectoryError, Vec3, left_jacobian_so3,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::rotation_chart;

/// Computes translational and rotational derivatives up to `order`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivativeEstimator {
    pub order: u32,
}

impl DerivativeEstimator {
    pub fn new(order: u32) -> Self {
        Self { order }
    }

    /// Replace the derivatives of `trajectory` with freshly computed ones.
    pub fn apply(&self, trajectory: &mut Trajectory) -> Result<(), TrajectoryError> {
        trajectory.clear_derivatives();
        if self.order == 0 || trajectory.is_empty() {
            return Ok(());
        }
        let h = 1.0 / trajectory.sample_rate();

        let mut linear = trajectory.translations();
        for k in 1..=self.order {
            linear = differentiate(&linear, h);
            trajectory.insert_derivative(DerivativeKind::translational(k), linear.clone())?;
        }

        let mut angular = angular_velocity(trajectory, h);
        trajectory.insert_derivative(DerivativeKind::rotational(1), angular.clone())?;
        for k in 2..=self.order {
            angular = differentiate(&angular, h);
            trajectory.insert_derivative(DerivativeKind::rotational(k), angular.clone())?;
        }
        debug!(
            "computed derivatives up to order {} over {} samples",
            self.order,
            trajectory.len()
        );
        Ok(())
    }
}

/// Angular velocity in the parent frame for every sample.
pub fn angular_velocity(trajectory: &Trajectory, h: Real) -> Vec<Vec3> {
    let Some(first) = trajectory.poses().first() else {
        return Vec::new();
    };
    let r0 = first.orientation;
    let phi = rotation_chart(&r0, trajectory.poses().iter().map(|p| p.orientation));
    let phi_dot = differentiate(&phi, h);
    phi.iter()
        .zip(&phi_dot)
        .map(|(p, d)| r0 * (left_jacobian_so3(p) * d))
        .collect()
}

/// First derivative of a uniformly sampled vector series with step `h`.
pub fn differentiate(x: &[Vec3], h: Real) -> Vec<Vec3> {
    let n = x.len();
    match n {
        0 => Vec::new(),
        1 => vec![Vec3::zeros()],
        2 => {
            let d = (x[1] - x[0]) / h;
            vec![d, d]
        }
        3 | 4 => (0..n)
            .map(|i| {
                if i == 0 {
                    (x[0] * -3.0 + x[1] * 4.0 - x[2]) / (2.0 * h)
                } else if i == n - 1 {
                    (x[n - 1] * 3.0 - x[n - 2] * 4.0 + x[n - 3]) / (2.0 * h)
                } else {
                    (x[i + 1] - x[i - 1]) / (2.0 * h)
                }
            })
            .collect(),
        _ => (0..n)
            .map(|i| {
                let d = 12.0 * h;
                if i == 0 {
                    (x[0] * -25.0 + x[1] * 48.0 - x[2] * 36.0 + x[3] * 16.0 - x[4] * 3.0) / d
                } else if i == 1 {
                    (x[0] * -3.0 - x[1] * 10.0 + x[2] * 18.0 - x[3] * 6.0 + x[4]) / d
                } else if i == n - 2 {
                    (x[n - 1] * 3.0 + x[n - 2] * 10.0 - x[n - 3] * 18.0 + x[n - 4] * 6.0
                        - x[n - 5])
                        / d
                } else if i == n - 1 {
                    (x[n - 1] * 25.0 - x[n - 2] * 48.0 + x[n - 3] * 36.0 - x[n - 4] * 16.0
                        + x[n - 5] * 3.0)
                        / d
                } else {
                    (x[i - 2] - x[i - 1] * 8.0 + x[i + 1] * 8.0 - x[i + 2]) / d
                }
            })
            .collect(),
    }
}
