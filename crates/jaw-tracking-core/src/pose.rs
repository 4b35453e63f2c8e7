//! Validated pose samples and rigid body streams.

use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Iso3, Mat3, Quat, ROTATION_TOLERANCE, Real, Vec3, rotation_from_matrix};

/// Reasons a pose sample is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoseError {
    /// Position, orientation, or timestamp contains NaN or infinity.
    #[error("pose contains non-finite values")]
    NonFinite,
    /// Quaternion norm deviates from 1 beyond tolerance.
    #[error("quaternion is not unit length (norm {0})")]
    NotUnitQuaternion(Real),
    /// Rotation matrix is not orthonormal.
    #[error("rotation matrix is not orthonormal (max deviation {0})")]
    NotOrthonormal(Real),
    /// Rotation matrix has negative determinant.
    #[error("rotation matrix is a reflection (det {0})")]
    Reflection(Real),
    /// Homogeneous matrix bottom row is not `[0 0 0 1]`.
    #[error("matrix is not a homogeneous rigid transform")]
    NotHomogeneous,
}

/// Identity of a tracked rigid body, e.g. `"HP"`, `"MP"`, `"CT"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub String);

impl BodyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BodyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single timestamped rigid-body pose.
///
/// The orientation is always a valid rotation. Constructors taking raw
/// quaternion coordinates or matrices reject malformed input instead of
/// normalizing it away; the JSON form goes through the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseRecord", into = "PoseRecord")]
pub struct Pose {
    /// Sample time in seconds.
    pub timestamp: Real,
    /// Origin of the body frame in the parent frame.
    pub position: Vec3,
    /// Orientation of the body frame in the parent frame.
    pub orientation: Quat,
}

impl Pose {
    /// Create a pose from an already valid unit quaternion.
    pub fn new(timestamp: Real, position: Vec3, orientation: Quat) -> Self {
        Self {
            timestamp,
            position,
            orientation,
        }
    }

    /// Create a pose from raw quaternion coordinates `(w, x, y, z)`.
    ///
    /// # Errors
    ///
    /// [`PoseError::NonFinite`] for NaN/inf components and
    /// [`PoseError::NotUnitQuaternion`] when the norm deviates from 1.
    pub fn from_quaternion(
        timestamp: Real,
        position: Vec3,
        wxyz: [Real; 4],
    ) -> Result<Self, PoseError> {
        check_finite(timestamp, &position)?;
        if wxyz.iter().any(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        let q = Quaternion::new(wxyz[0], wxyz[1], wxyz[2], wxyz[3]);
        let norm = q.norm();
        if (norm - 1.0).abs() > ROTATION_TOLERANCE {
            return Err(PoseError::NotUnitQuaternion(norm));
        }
        Ok(Self::new(
            timestamp,
            position,
            UnitQuaternion::from_quaternion(q),
        ))
    }

    /// Create a pose from a 3×3 rotation matrix.
    pub fn from_rotation_matrix(
        timestamp: Real,
        position: Vec3,
        rotation: &Mat3,
    ) -> Result<Self, PoseError> {
        check_finite(timestamp, &position)?;
        let orientation = rotation_from_matrix(rotation)?;
        Ok(Self::new(timestamp, position, orientation))
    }

    /// Create a pose from a rigid transform.
    pub fn from_iso(timestamp: Real, iso: &Iso3) -> Self {
        Self::new(timestamp, iso.translation.vector, iso.rotation)
    }

    /// The pose as a rigid transform `parent_se3_body`.
    pub fn to_iso(&self) -> Iso3 {
        Iso3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Quaternion coordinates as `[w, x, y, z]`.
    pub fn wxyz(&self) -> [Real; 4] {
        let q = self.orientation.quaternion();
        [q.w, q.i, q.j, q.k]
    }
}

fn check_finite(timestamp: Real, position: &Vec3) -> Result<(), PoseError> {
    if !timestamp.is_finite() || position.iter().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFinite);
    }
    Ok(())
}

/// Serialized form of [`Pose`]; quaternion stored as `[w, x, y, z]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: Real,
    pub position: [Real; 3],
    pub orientation: [Real; 4],
}

impl TryFrom<PoseRecord> for Pose {
    type Error = PoseError;

    fn try_from(r: PoseRecord) -> Result<Self, Self::Error> {
        Pose::from_quaternion(r.timestamp, Vec3::from(r.position), r.orientation)
    }
}

impl From<Pose> for PoseRecord {
    fn from(p: Pose) -> Self {
        Self {
            timestamp: p.timestamp,
            position: p.position.into(),
            orientation: p.wxyz(),
        }
    }
}

/// One element of a pose stream: either a pose or an explicit gap marker for
/// an occluded/lost body. A gap is never encoded as a zero pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoseSample {
    Pose(Pose),
    Gap { timestamp: Real },
}

impl PoseSample {
    pub fn timestamp(&self) -> Real {
        match self {
            PoseSample::Pose(p) => p.timestamp,
            PoseSample::Gap { timestamp } => *timestamp,
        }
    }

    pub fn pose(&self) -> Option<&Pose> {
        match self {
            PoseSample::Pose(p) => Some(p),
            PoseSample::Gap { .. } => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, PoseSample::Gap { .. })
    }
}

impl From<Pose> for PoseSample {
    fn from(p: Pose) -> Self {
        PoseSample::Pose(p)
    }
}

/// A named rigid body and its recorded (offline) pose stream.
///
/// The stream is read-only input; it is produced by an external collaborator
/// (file reader, capture driver) and never modified by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub id: BodyId,
    pub samples: Vec<PoseSample>,
}

impl RigidBody {
    pub fn new(id: impl Into<BodyId>, samples: Vec<PoseSample>) -> Self {
        Self {
            id: id.into(),
            samples,
        }
    }

    /// Build a gap-free stream from poses.
    pub fn from_poses(id: impl Into<BodyId>, poses: impl IntoIterator<Item = Pose>) -> Self {
        Self::new(id, poses.into_iter().map(PoseSample::Pose).collect())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of gap markers in the stream.
    pub fn gap_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_gap()).count()
    }

    /// Median spacing of consecutive timestamps, `None` below two samples.
    pub fn median_interval(&self) -> Option<Real> {
        let mut dt: Vec<Real> = self
            .samples
            .windows(2)
            .map(|w| w[1].timestamp() - w[0].timestamp())
            .collect();
        if dt.is_empty() {
            return None;
        }
        dt.sort_by(|a, b| a.total_cmp(b));
        Some(dt[dt.len() / 2])
    }
}

impl From<String> for BodyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_interval_ignores_jitter_and_gaps() {
        let times = [0.0, 0.01, 0.02, 0.035, 0.04, 0.05];
        let mut samples: Vec<PoseSample> = times
            .iter()
            .map(|&t| Pose::new(t, Vec3::zeros(), Quat::identity()).into())
            .collect();
        samples[2] = PoseSample::Gap { timestamp: 0.02 };
        let body = RigidBody::new("HP", samples);
        assert!((body.median_interval().unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(RigidBody::new("HP", Vec::new()).median_interval(), None);
    }

    #[test]
    fn rejects_non_unit_quaternion() {
        let r = Pose::from_quaternion(0.0, Vec3::zeros(), [1.0, 0.1, 0.0, 0.0]);
        assert!(matches!(r, Err(PoseError::NotUnitQuaternion(_))));
    }

    #[test]
    fn rejects_nan_position() {
        let r = Pose::from_quaternion(0.0, Vec3::new(f64::NAN, 0.0, 0.0), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(r, Err(PoseError::NonFinite));
    }

    #[test]
    fn json_roundtrip_validates() {
        let pose = Pose::from_quaternion(
            0.5,
            Vec3::new(1.0, 2.0, 3.0),
            [0.5_f64.sqrt(), 0.5_f64.sqrt(), 0.0, 0.0],
        )
        .unwrap();
        let json = serde_json::to_string(&pose).unwrap();
        let back: Pose = serde_json::from_str(&json).unwrap();
        assert!((back.position - pose.position).norm() < 1e-12);
        assert!(crate::rotation_angle_between(&back.orientation, &pose.orientation) < 1e-12);

        let bad = r#"{"timestamp":0.0,"position":[0,0,0],"orientation":[2.0,0,0,0]}"#;
        assert!(serde_json::from_str::<Pose>(bad).is_err());
    }

    #[test]
    fn gap_sample_has_no_pose() {
        let gap = PoseSample::Gap { timestamp: 1.0 };
        assert!(gap.pose().is_none());
        assert!(gap.is_gap());
        assert_eq!(gap.timestamp(), 1.0);

        let body = RigidBody::new(
            "MP",
            vec![
                PoseSample::Pose(Pose::new(0.0, Vec3::zeros(), Quat::identity())),
                gap,
            ],
        );
        assert_eq!(body.gap_count(), 1);
        assert_eq!(body.id.as_str(), "MP");
    }
}
