//! Rigid point-set registration (orthogonal Procrustes / Kabsch).
//!
//! Given corresponding points `s_i` (source frame) and `t_i` (target frame),
//! finds the proper rotation `R` and translation `t` minimizing
//! `Σ ||R s_i + t - t_i||²` in closed form:
//!
//! 1. center both sets on their centroids,
//! 2. `H = Σ (s_i - s̄)(t_i - t̄)ᵀ`, `H = U Σ Vᵀ`,
//! 3. `R = V · D · Uᵀ` with `D = diag(1, 1, det(V Uᵀ))` (reflection fix on the
//!    weakest singular direction),
//! 4. `t = t̄ - R s̄`.
//!
//! The result is `target_se3_source`. No iteration, no randomness.

use jaw_tracking_core::{
    DEGENERACY_TOLERANCE, Iso3, LandmarkPoint, LandmarkSetError, Mat3, ModelPoint, Real, Vec3,
    check_landmark_geometry,
};
use log::debug;
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during landmark registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// Fewer than 3 correspondences were provided.
    #[error("need at least 3 point pairs, got {0}")]
    NotEnoughPoints(usize),
    /// Source and target have different lengths.
    #[error("source has {source_len} points but target has {target_len}")]
    LengthMismatch { source_len: usize, target_len: usize },
    /// One of the point sets is collinear or coincident.
    #[error(transparent)]
    Degenerate(#[from] LandmarkSetError),
    /// Cross-covariance has rank < 2.
    #[error("cross-covariance is rank deficient (singular values {0:?})")]
    RankDeficient([Real; 3]),
    /// A captured landmark has no counterpart in the model.
    #[error("landmark `{0}` has no model point")]
    MissingModelPoint(String),
    /// Linear solve (SVD) failed.
    #[error("svd failed during registration")]
    SvdFailed,
}

/// Outcome of a registration including residual statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResult {
    /// `target_se3_source`.
    pub transform: Iso3,
    /// Per-point residual distance `||T s_i - t_i||`.
    pub residuals: Vec<Real>,
    /// Root mean square of the residuals.
    pub rmse: Real,
}

/// Closed-form rigid landmark registrar.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkRegistrar;

impl LandmarkRegistrar {
    /// Register `source` onto `target` and return `target_se3_source`.
    ///
    /// # Errors
    ///
    /// [`RegistrationError`] for fewer than 3 pairs, mismatched lengths, or
    /// collinear/degenerate geometry.
    pub fn register(source: &[Vec3], target: &[Vec3]) -> Result<Iso3, RegistrationError> {
        Self::register_with_residuals(source, target).map(|r| r.transform)
    }

    /// Like [`register`](Self::register) but also reports residuals.
    pub fn register_with_residuals(
        source: &[Vec3],
        target: &[Vec3],
    ) -> Result<RegistrationResult, RegistrationError> {
        if source.len() != target.len() {
            return Err(RegistrationError::LengthMismatch {
                source_len: source.len(),
                target_len: target.len(),
            });
        }
        if source.len() < 3 {
            return Err(RegistrationError::NotEnoughPoints(source.len()));
        }
        check_landmark_geometry("source", source)?;
        check_landmark_geometry("target", target)?;

        let n = source.len() as Real;
        let cs = source.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;
        let ct = target.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;

        let mut h = Mat3::zeros();
        for (s, t) in source.iter().zip(target) {
            h += (s - cs) * (t - ct).transpose();
        }

        let rotation = rotation_from_cross_covariance(&h)?;
        let translation = ct - rotation * cs;

        let transform = Iso3::from_parts(
            Translation3::from(translation),
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation)),
        );

        let residuals: Vec<Real> = source
            .iter()
            .zip(target)
            .map(|(s, t)| (transform.transform_vector(s) + transform.translation.vector - t).norm())
            .collect();
        let rmse = (residuals.iter().map(|r| r * r).sum::<Real>() / n).sqrt();
        debug!(
            "registered {} landmarks: rmse {:.6}, max residual {:.6}",
            source.len(),
            rmse,
            residuals.iter().copied().fold(0.0, Real::max)
        );

        Ok(RegistrationResult {
            transform,
            residuals,
            rmse,
        })
    }

    /// Register captured landmarks onto named model points.
    ///
    /// Pairs are formed by name in the order of `captured`; every captured
    /// landmark must exist in `model`.
    pub fn register_landmarks(
        captured: &[LandmarkPoint],
        model: &[ModelPoint],
    ) -> Result<RegistrationResult, RegistrationError> {
        let mut source = Vec::with_capacity(captured.len());
        let mut target = Vec::with_capacity(captured.len());
        for lm in captured {
            let mp = model
                .iter()
                .find(|m| m.name == lm.name)
                .ok_or_else(|| RegistrationError::MissingModelPoint(lm.name.clone()))?;
            source.push(lm.captured_position);
            target.push(mp.position);
        }
        Self::register_with_residuals(&source, &target)
    }
}

/// `R = V · D · Uᵀ` from `H = U Σ Vᵀ`, correcting reflections.
fn rotation_from_cross_covariance(h: &Mat3) -> Result<Mat3, RegistrationError> {
    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;
    let sv = svd.singular_values;

    let mut sorted = [sv[0], sv[1], sv[2]];
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted[0] <= Real::EPSILON || sorted[1] <= DEGENERACY_TOLERANCE * sorted[0] {
        return Err(RegistrationError::RankDeficient(sorted));
    }

    // Flip the direction of the weakest singular value if needed.
    let weakest = (0..3)
        .min_by(|&a, &b| sv[a].total_cmp(&sv[b]))
        .unwrap_or(2);
    let v = v_t.transpose();
    let det = (v * u.transpose()).determinant();
    let mut d = Mat3::identity();
    d[(weakest, weakest)] = if det < 0.0 { -1.0 } else { 1.0 };

    Ok(v * d * u.transpose())
}
