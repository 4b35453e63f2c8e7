//! Smooth synthetic head and jaw motions.

use nalgebra::{Rotation3, Translation3};

use crate::{Iso3, Pose, Real};

/// Build an isometry from Euler angles (roll, pitch, yaw) and a translation.
pub fn make_iso(angles: (Real, Real, Real), t: (Real, Real, Real)) -> Iso3 {
    let rot = Rotation3::from_euler_angles(angles.0, angles.1, angles.2);
    Iso3::from_parts(Translation3::new(t.0, t.1, t.2), rot.into())
}

/// Timestamp of sample `i` at `sample_rate` Hz.
pub fn sample_time(i: usize, sample_rate: Real) -> Real {
    i as Real / sample_rate
}

/// Slow head drift in the tracking-system frame (mm, rad).
pub fn head_motion(num_samples: usize, sample_rate: Real) -> Vec<Iso3> {
    (0..num_samples)
        .map(|i| {
            let t = sample_time(i, sample_rate);
            make_iso(
                (
                    0.05 * (0.3 * t).sin(),
                    -0.04 * (0.2 * t).cos(),
                    0.1 + 0.03 * (0.25 * t).sin(),
                ),
                (
                    120.0 + 5.0 * (0.4 * t).sin(),
                    -40.0 + 3.0 * (0.3 * t).cos(),
                    900.0 + 2.0 * (0.5 * t).sin(),
                ),
            )
        })
        .collect()
}

/// Rhythmic jaw opening: rotation about the hinge axis plus protrusion.
///
/// Returns `head_se3_jaw` per sample for an opening cycle at `frequency` Hz.
pub fn jaw_motion(num_samples: usize, sample_rate: Real, frequency: Real) -> Vec<Iso3> {
    let w = 2.0 * std::f64::consts::PI * frequency;
    (0..num_samples)
        .map(|i| {
            let t = sample_time(i, sample_rate);
            let open = 0.5 * (1.0 - (w * t).cos());
            make_iso(
                (0.2 * open, 0.01 * (w * t).sin(), 0.005 * (w * t).sin()),
                (1.5 * open, -8.0 * open, 2.0 + 3.0 * open),
            )
        })
        .collect()
}

/// Convert transforms to poses stamped at `sample_rate`.
pub fn poses_from_isos(isos: &[Iso3], sample_rate: Real) -> Vec<Pose> {
    isos.iter()
        .enumerate()
        .map(|(i, iso)| Pose::from_iso(sample_time(i, sample_rate), iso))
        .collect()
}
