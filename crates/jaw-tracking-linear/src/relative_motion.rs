//! Relative motion between two tracked rigid bodies.
//!
//! For synchronized streams of a reference body `R` and a moving body `M`
//! (both given in the tracking-system frame `W`), the moving body's pose in
//! the reference body's instantaneous frame is
//!
//! `R_se3_M(t) = (W_se3_R(t))⁻¹ · W_se3_M(t)`.

use jaw_tracking_core::{BodyId, Iso3, Pose, PoseSample, Real, RigidBody};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default timestamp tolerance between paired samples (seconds).
pub const DEFAULT_SYNC_EPSILON: Real = 1e-6;

/// Streams cannot be paired sample by sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynchronizationError {
    #[error("streams differ in length: {reference} has {reference_len} samples, {moving} has {moving_len}")]
    LengthMismatch {
        reference: BodyId,
        moving: BodyId,
        reference_len: usize,
        moving_len: usize,
    },
    #[error(
        "timestamps diverge at sample {index}: {reference}={reference_ts}, {moving}={moving_ts} (epsilon {epsilon})"
    )]
    TimestampMismatch {
        reference: BodyId,
        moving: BodyId,
        index: usize,
        reference_ts: Real,
        moving_ts: Real,
        epsilon: Real,
    },
}

/// Computes per-sample relative poses of a moving body in a reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeMotionComputer {
    /// Maximum allowed timestamp difference between paired samples.
    pub epsilon: Real,
}

impl Default for RelativeMotionComputer {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_SYNC_EPSILON,
        }
    }
}

impl RelativeMotionComputer {
    pub fn new(epsilon: Real) -> Self {
        Self { epsilon }
    }

    /// `reference⁻¹ · moving` as a rigid transform.
    pub fn relative_pose(reference: &Pose, moving: &Pose) -> Iso3 {
        reference.to_iso().inverse() * moving.to_iso()
    }

    /// Relative motion for every sample pair.
    ///
    /// Output timestamps follow the reference stream. A gap in either stream
    /// yields a gap in the output; gaps are never turned into poses here.
    ///
    /// # Errors
    ///
    /// [`SynchronizationError`] when lengths differ or any timestamp pair
    /// diverges by more than `epsilon`.
    pub fn compute(
        &self,
        reference: &RigidBody,
        moving: &RigidBody,
    ) -> Result<Vec<PoseSample>, SynchronizationError> {
        if reference.len() != moving.len() {
            return Err(SynchronizationError::LengthMismatch {
                reference: reference.id.clone(),
                moving: moving.id.clone(),
                reference_len: reference.len(),
                moving_len: moving.len(),
            });
        }

        let mut out = Vec::with_capacity(reference.len());
        let mut gaps = 0usize;
        for (index, (r, m)) in reference.samples.iter().zip(&moving.samples).enumerate() {
            let (rt, mt) = (r.timestamp(), m.timestamp());
            if !((rt - mt).abs() <= self.epsilon) {
                return Err(SynchronizationError::TimestampMismatch {
                    reference: reference.id.clone(),
                    moving: moving.id.clone(),
                    index,
                    reference_ts: rt,
                    moving_ts: mt,
                    epsilon: self.epsilon,
                });
            }
            match (r.pose(), m.pose()) {
                (Some(rp), Some(mp)) => {
                    let rel = Self::relative_pose(rp, mp);
                    out.push(PoseSample::Pose(Pose::from_iso(rt, &rel)));
                }
                _ => {
                    gaps += 1;
                    out.push(PoseSample::Gap { timestamp: rt });
                }
            }
        }
        debug!(
            "relative motion {} in {}: {} samples, {} gaps",
            moving.id,
            reference.id,
            out.len(),
            gaps
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaw_tracking_core::synthetic::motion::{head_motion, jaw_motion, poses_from_isos};
    use jaw_tracking_core::{Quat, Vec3, pose_error};

    fn streams(n: usize) -> (RigidBody, RigidBody, Vec<Iso3>) {
        let rate = 100.0;
        let head = head_motion(n, rate);
        let jaw = jaw_motion(n, rate, 1.0);
        let mouth: Vec<Iso3> = head.iter().zip(&jaw).map(|(h, j)| h * j).collect();
        (
            RigidBody::from_poses("HP", poses_from_isos(&head, rate)),
            RigidBody::from_poses("MP", poses_from_isos(&mouth, rate)),
            jaw,
        )
    }

    #[test]
    fn recovers_relative_motion() {
        let (hp, mp, jaw) = streams(50);
        let rel = RelativeMotionComputer::default().compute(&hp, &mp).unwrap();
        assert_eq!(rel.len(), 50);
        for (s, gt) in rel.iter().zip(&jaw) {
            let (dt, ang) = pose_error(&s.pose().unwrap().to_iso(), gt);
            assert!(dt < 1e-9 && ang < 1e-9, "dt {} ang {}", dt, ang);
        }
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let (hp, mut mp, _) = streams(10);
        mp.samples.pop();
        let err = RelativeMotionComputer::default().compute(&hp, &mp).unwrap_err();
        assert!(matches!(
            err,
            SynchronizationError::LengthMismatch {
                reference_len: 10,
                moving_len: 9,
                ..
            }
        ));
    }

    #[test]
    fn diverging_timestamps_are_fatal() {
        let (hp, mut mp, _) = streams(10);
        if let PoseSample::Pose(p) = &mut mp.samples[4] {
            p.timestamp += 0.001;
        }
        let err = RelativeMotionComputer::new(1e-4).compute(&hp, &mp).unwrap_err();
        assert!(matches!(
            err,
            SynchronizationError::TimestampMismatch { index: 4, .. }
        ));
        assert!(RelativeMotionComputer::new(1e-2).compute(&hp, &mp).is_ok());
    }

    #[test]
    fn gaps_propagate() {
        let (hp, mut mp, _) = streams(5);
        mp.samples[2] = PoseSample::Gap { timestamp: 0.02 };
        let rel = RelativeMotionComputer::default().compute(&hp, &mp).unwrap();
        assert!(rel[2].is_gap());
        assert!(!rel[1].is_gap());
    }

    #[test]
    fn relative_pose_of_identical_bodies_is_identity() {
        let p = Pose::new(0.0, Vec3::new(1.0, 2.0, 3.0), Quat::from_euler_angles(0.3, 0.2, 0.1));
        let rel = RelativeMotionComputer::relative_pose(&p, &p);
        let (dt, ang) = pose_error(&rel, &Iso3::identity());
        assert!(dt < 1e-12 && ang < 1e-12);
    }
}
