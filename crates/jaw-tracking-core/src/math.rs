//! Linear algebra type aliases, rotation maps, and rigid transform helpers.
//!
//! Rigid transforms are represented as [`Iso3`] throughout the workspace.
//! A transform written `a_se3_b` maps points from frame `b` into frame `a`,
//! so composition reads right to left: `a_se3_c = a_se3_b * b_se3_c`.
//!
//! [`Transform4x4`] is the same type; the alias exists for call sites that
//! talk about the homogeneous matrix. Inversion through [`Iso3::inverse`] is
//! exact: the rotation is conjugated and the translation is rotated and
//! negated, no matrix inverse is computed.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};

use crate::PoseError;

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// Unit quaternion with [`Real`] components.
pub type Quat = UnitQuaternion<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;
/// Homogeneous rigid transform; same representation as [`Iso3`].
pub type Transform4x4 = Iso3;

/// Tolerance used when accepting rotation matrices and quaternions from
/// external sources.
pub const ROTATION_TOLERANCE: Real = 1e-6;

/// log: SO(3) -> so(3) as a 3-vector (axis * angle), angle in `[0, π]`.
///
/// Uses `atan2` on the quaternion parts so small angles keep full precision.
pub fn log_so3(q: &Quat) -> Vec3 {
    let q = q.quaternion();
    let (w, v) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };
    let n = v.norm();
    if n < 1e-12 {
        // sin(θ/2) ≈ θ/2
        return v * 2.0;
    }
    v * (2.0 * n.atan2(w) / n)
}

/// exp: so(3) -> SO(3) from a rotation vector.
pub fn exp_so3(phi: &Vec3) -> Quat {
    UnitQuaternion::from_scaled_axis(*phi)
}

/// Cross-product matrix `[v]×`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Left Jacobian of SO(3).
///
/// Maps the time derivative of a rotation vector `φ` to the spatial angular
/// velocity of `exp(φ)`: `ω = J_l(φ) · φ̇`.
pub fn left_jacobian_so3(phi: &Vec3) -> Mat3 {
    let theta = phi.norm();
    let k = skew(phi);
    let (a, b) = if theta < 1e-6 {
        let t2 = theta * theta;
        (0.5 - t2 / 24.0, 1.0 / 6.0 - t2 / 120.0)
    } else {
        let t2 = theta * theta;
        (
            (1.0 - theta.cos()) / t2,
            (theta - theta.sin()) / (t2 * theta),
        )
    };
    Mat3::identity() + k * a + k * k * b
}

/// Convert a rigid transform to its homogeneous 4×4 matrix.
pub fn to_homogeneous(iso: &Iso3) -> Mat4 {
    iso.to_homogeneous()
}

/// Validate a 3×3 matrix as a proper rotation and convert it.
///
/// The matrix must be orthonormal within [`ROTATION_TOLERANCE`] with
/// determinant `+1`; reflections and scaled matrices are rejected.
pub fn rotation_from_matrix(m: &Mat3) -> Result<Quat, PoseError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFinite);
    }
    let ortho = (m.transpose() * m - Mat3::identity()).amax();
    if ortho > ROTATION_TOLERANCE {
        return Err(PoseError::NotOrthonormal(ortho));
    }
    let det = m.determinant();
    if det < 0.0 {
        return Err(PoseError::Reflection(det));
    }
    Ok(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(*m),
    ))
}

/// Validate a homogeneous 4×4 matrix as a rigid transform and convert it.
pub fn iso_from_homogeneous(m: &Mat4) -> Result<Iso3, PoseError> {
    let bottom = m.fixed_view::<1, 4>(3, 0);
    let expected = nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0);
    if (bottom - expected).amax() > ROTATION_TOLERANCE {
        return Err(PoseError::NotHomogeneous);
    }
    let rot: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = rotation_from_matrix(&rot)?;
    let t: Vec3 = m.fixed_view::<3, 1>(0, 3).into_owned();
    if t.iter().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFinite);
    }
    Ok(Iso3::from_parts(Translation3::from(t), rotation))
}

/// Compare two SE(3) poses via translation distance and rotation angle.
///
/// Returns `(translation_error, rotation_error_rad)`.
pub fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let dt = (a.translation.vector - b.translation.vector).norm();
    (dt, rotation_angle_between(&a.rotation, &b.rotation))
}

/// Angle of the rotation taking `a` to `b`, accurate for tiny angles.
pub fn rotation_angle_between(a: &Quat, b: &Quat) -> Real {
    let delta = a.inverse() * b;
    let q = delta.quaternion();
    2.0 * q.imag().norm().atan2(q.w.abs())
}

/// Arithmetic mean of a set of vectors, `None` when empty.
pub fn mean_vec3<'a, I>(points: I) -> Option<Vec3>
where
    I: IntoIterator<Item = &'a Vec3>,
{
    let mut sum = Vec3::zeros();
    let mut count = 0usize;
    for p in points {
        sum += p;
        count += 1;
    }
    (count > 0).then(|| sum / count as Real)
}
