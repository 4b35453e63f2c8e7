//! Seam interpolation between two pose samples.
//!
//! A seam bridges the last sample of one piece and the first sample of the
//! next with `transition_frames` synthetic samples at parameters
//! `s_k = k / (n + 1)`. Cubic and Hermite bridges use at most one
//! neighboring sample on each side, never a global fit.

use jaw_tracking_core::{Pose, PoseSample, Quat, Real, Vec3, exp_so3, log_so3};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{SegmentError, renormalize, unwrap_rotation_vector};

/// How a seam between two pieces is bridged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Linear position, normalized-linear orientation.
    #[default]
    Linear,
    /// Catmull–Rom through the neighboring samples.
    Cubic,
    /// Linear position, spherical-linear orientation.
    Slerp,
    /// Cubic Hermite with tangents matched to the per-sample velocity at each end.
    Hermite,
    /// Hard concatenation; no transition samples.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterpolationPolicy {
    pub method: InterpolationMethod,
    #[serde(default)]
    pub transition_frames: usize,
}

impl InterpolationPolicy {
    pub fn new(method: InterpolationMethod, transition_frames: usize) -> Self {
        Self {
            method,
            transition_frames,
        }
    }

    /// Number of samples the bridge inserts.
    pub fn inserted_frames(&self) -> usize {
        match self.method {
            InterpolationMethod::None => 0,
            _ => self.transition_frames,
        }
    }
}

/// The two samples a seam connects and their outer neighbors.
#[derive(Debug, Clone, Copy)]
pub struct Seam<'a> {
    pub before: Option<&'a Pose>,
    pub start: &'a Pose,
    pub end: &'a Pose,
    pub after: Option<&'a Pose>,
}

impl<'a> Seam<'a> {
    pub fn new(start: &'a Pose, end: &'a Pose) -> Self {
        Self {
            before: None,
            start,
            end,
            after: None,
        }
    }

    pub fn with_neighbors(mut self, before: Option<&'a Pose>, after: Option<&'a Pose>) -> Self {
        self.before = before;
        self.after = after;
        self
    }
}

/// Synthetic samples strictly between `seam.start` and `seam.end`.
///
/// Timestamps are interpolated linearly; callers that re-stamp the combined
/// stream may ignore them.
pub fn bridge(seam: &Seam<'_>, policy: &InterpolationPolicy) -> Vec<Pose> {
    let n = policy.inserted_frames();
    if n == 0 {
        return Vec::new();
    }
    let steps = (n + 1) as Real;
    let (a, b) = (seam.start, seam.end);

    // Orientation chart anchored at the seam start.
    let inv = a.orientation.inverse();
    let r1 = log_so3(&(inv * b.orientation));
    let rb = seam
        .before
        .map(|p| unwrap_rotation_vector(&Vec3::zeros(), log_so3(&(inv * p.orientation))));
    let ra = seam
        .after
        .map(|p| unwrap_rotation_vector(&r1, log_so3(&(inv * p.orientation))));

    let tangents = |p0: Vec3, p1: Vec3, before: Option<Vec3>, after: Option<Vec3>| match policy
        .method
    {
        InterpolationMethod::Cubic => (
            before.map_or(p1 - p0, |pb| (p1 - pb) * 0.5),
            after.map_or(p1 - p0, |pa| (pa - p0) * 0.5),
        ),
        _ => (
            before.map_or(p1 - p0, |pb| (p0 - pb) * steps),
            after.map_or(p1 - p0, |pa| (pa - p1) * steps),
        ),
    };

    let (pm0, pm1) = tangents(
        a.position,
        b.position,
        seam.before.map(|p| p.position),
        seam.after.map(|p| p.position),
    );
    let (rm0, rm1) = tangents(Vec3::zeros(), r1, rb, ra);

    (1..=n)
        .map(|k| {
            let s = k as Real / steps;
            let timestamp = a.timestamp + s * (b.timestamp - a.timestamp);
            let (position, orientation) = match policy.method {
                InterpolationMethod::Linear => (
                    a.position.lerp(&b.position, s),
                    nlerp(&a.orientation, &b.orientation, s),
                ),
                InterpolationMethod::Slerp | InterpolationMethod::None => (
                    a.position.lerp(&b.position, s),
                    a.orientation * exp_so3(&(r1 * s)),
                ),
                InterpolationMethod::Cubic | InterpolationMethod::Hermite => (
                    hermite(&a.position, &pm0, &b.position, &pm1, s),
                    a.orientation * exp_so3(&hermite(&Vec3::zeros(), &rm0, &r1, &rm1, s)),
                ),
            };
            Pose::new(timestamp, position, renormalize(orientation))
        })
        .collect()
}

/// Interpolate between two poses at parameter `s`, stamping `timestamp`.
pub fn slerp_pose(a: &Pose, b: &Pose, s: Real, timestamp: Real) -> Pose {
    let r = log_so3(&(a.orientation.inverse() * b.orientation));
    Pose::new(
        timestamp,
        a.position.lerp(&b.position, s),
        renormalize(a.orientation * exp_so3(&(r * s))),
    )
}

/// Replace interior gaps by time-weighted interpolation of their neighbors.
///
/// Runs longer than `max_gap` samples fail, as do gaps touching either end
/// of the stream (no neighbor to interpolate from).
pub fn fill_gaps(samples: &[PoseSample], max_gap: usize) -> Result<Vec<Pose>, SegmentError> {
    let mut out: Vec<Pose> = Vec::with_capacity(samples.len());
    let mut pending: Vec<Real> = Vec::new();
    let mut run_start = 0usize;
    let mut filled = 0usize;
    for (idx, sample) in samples.iter().enumerate() {
        match sample {
            PoseSample::Gap { timestamp } => {
                if pending.is_empty() {
                    run_start = idx;
                }
                pending.push(*timestamp);
            }
            PoseSample::Pose(pose) => {
                if !pending.is_empty() {
                    let Some(prev) = out.last().copied() else {
                        return Err(SegmentError::UnboundedGap {
                            start: run_start,
                            end: idx - 1,
                        });
                    };
                    if pending.len() > max_gap {
                        return Err(SegmentError::GapTooLong {
                            start: run_start,
                            len: pending.len(),
                            max: max_gap,
                        });
                    }
                    let span = pose.timestamp - prev.timestamp;
                    for &t in &pending {
                        let s = if span > 0.0 {
                            (t - prev.timestamp) / span
                        } else {
                            0.5
                        };
                        out.push(slerp_pose(&prev, pose, s, t));
                    }
                    filled += pending.len();
                    pending.clear();
                }
                out.push(*pose);
            }
        }
    }
    if !pending.is_empty() {
        return Err(SegmentError::UnboundedGap {
            start: run_start,
            end: samples.len() - 1,
        });
    }
    if filled > 0 {
        debug!("filled {} gap samples out of {}", filled, samples.len());
    }
    Ok(out)
}

fn nlerp(a: &Quat, b: &Quat, s: Real) -> Quat {
    let qa = a.quaternion();
    let mut qb = *b.quaternion();
    if qa.dot(&qb) < 0.0 {
        qb = -qb;
    }
    Quat::new_normalize(qa.lerp(&qb, s))
}

fn hermite(p0: &Vec3, m0: &Vec3, p1: &Vec3, m1: &Vec3, s: Real) -> Vec3 {
    let s2 = s * s;
    let s3 = s2 * s;
    p0 * (2.0 * s3 - 3.0 * s2 + 1.0)
        + m0 * (s3 - 2.0 * s2 + s)
        + p1 * (-2.0 * s3 + 3.0 * s2)
        + m1 * (s3 - s2)
}
