//! Time-domain processing of pose trajectories.
//!
//! - [`interpolate`]: seam interpolation between pose samples and gap filling.
//! - [`segment`]: extraction and ordered combination of sub-experiments.
//! - [`smoothing`]: Savitzky–Golay smoothing of translation and orientation.
//! - [`derivatives`]: translational and angular derivatives.
//!
//! Orientation channels are handled in a rotation-vector chart anchored at
//! the first sample, `φ_i = log(q_0⁻¹ q_i)`, unwrapped across the ±π
//! boundary and mapped back with `q_0 · exp(φ)`.

pub mod derivatives;
pub mod interpolate;
pub mod segment;
pub mod smoothing;

pub use derivatives::*;
pub use interpolate::*;
pub use segment::*;
pub use smoothing::*;

use jaw_tracking_core::{Quat, Vec3, exp_so3, log_so3};
use std::f64::consts::PI;

/// Rotation vectors of `orientations` relative to `origin`, unwrapped.
pub fn rotation_chart(origin: &Quat, orientations: impl IntoIterator<Item = Quat>) -> Vec<Vec3> {
    let inv = origin.inverse();
    let mut out: Vec<Vec3> = Vec::new();
    for q in orientations {
        let mut phi = log_so3(&(inv * q));
        if let Some(prev) = out.last() {
            phi = unwrap_rotation_vector(prev, phi);
        }
        out.push(phi);
    }
    out
}

/// Inverse of [`rotation_chart`].
pub fn from_rotation_chart(origin: &Quat, phi: &Vec3) -> Quat {
    origin * exp_so3(phi)
}

/// Pick the rotation vector equivalent to `phi` closest to `prev`.
///
/// `phi` and `phi - 2π·phi/|phi|` describe the same rotation.
pub fn unwrap_rotation_vector(prev: &Vec3, phi: Vec3) -> Vec3 {
    let angle = phi.norm();
    if angle < 1e-12 {
        return phi;
    }
    let axis = phi / angle;
    let mut best = phi;
    let mut best_dist = (phi - prev).norm();
    for k in [-1.0, 1.0] {
        let candidate = axis * (angle + k * 2.0 * PI);
        let dist = (candidate - prev).norm();
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }
    best
}

/// Re-normalize a quaternion that drifted off the unit sphere.
pub(crate) fn renormalize(q: Quat) -> Quat {
    let norm = q.as_ref().norm();
    if (norm - 1.0).abs() > 1e-12 {
        Quat::new_normalize(q.into_inner())
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaw_tracking_core::rotation_angle_between;

    #[test]
    fn chart_roundtrip_and_unwrap() {
        let origin = exp_so3(&Vec3::new(0.2, -0.1, 0.4));
        let axis = Vec3::new(0.0, 0.0, 1.0);
        // Sweep through π about a fixed axis.
        let qs: Vec<Quat> = (0..40)
            .map(|i| origin * exp_so3(&(axis * (2.8 + 0.02 * i as f64))))
            .collect();
        let chart = rotation_chart(&origin, qs.iter().copied());
        for w in chart.windows(2) {
            assert!((w[1] - w[0]).norm() < 0.03);
        }
        assert!(chart.last().unwrap().norm() > PI);
        for (phi, q) in chart.iter().zip(&qs) {
            let back = from_rotation_chart(&origin, phi);
            assert!(rotation_angle_between(&back, q) < 1e-9);
        }
    }
}
