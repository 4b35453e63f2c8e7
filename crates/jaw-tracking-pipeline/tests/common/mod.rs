//! Synthetic jaw tracking session shared by the integration tests.

#![allow(dead_code)]

use jaw_tracking_core::synthetic::motion::{head_motion, jaw_motion, make_iso, sample_time};
use jaw_tracking_core::synthetic::noise::GaussianNoise;
use jaw_tracking_core::{FrameRange, Iso3, ModelPoint, Pose, RigidBody, Vec3};
use jaw_tracking_linear::LandmarkSpec;
use jaw_tracking_pipeline::jaw_motion::{JawMotionInput, LandmarkPlan, ModelLandmarks};
use nalgebra::Point3;

pub const RATE: f64 = 200.0;
/// Frames the tool travels between two landmarks.
pub const TRAVEL: usize = 20;
/// Frames the tool rests on a landmark.
pub const DWELL: usize = 40;

pub const TIP: (f64, f64, f64) = (0.0, 0.0, -95.0);

pub struct Scenario {
    pub input: JawMotionInput,
    pub model_se3_hp: Iso3,
    pub model_se3_mp: Iso3,
    /// Ground-truth `HP_se3_MP` per motion sample.
    pub relative: Vec<Iso3>,
    /// Ground-truth landmark positions in their body frame, capture order.
    pub mandibular_truth: Vec<Vec3>,
    pub maxillary_truth: Vec<Vec3>,
}

impl Scenario {
    /// Expected mandible pose in model coordinates.
    pub fn expected(&self, i: usize) -> Iso3 {
        self.model_se3_hp * self.relative[i] * self.model_se3_mp.inverse()
    }
}

fn mandibular_model() -> Vec<ModelPoint> {
    vec![
        ModelPoint::new("lower_incisor", Vec3::new(0.0, -40.0, 10.0)),
        ModelPoint::new("left_molar", Vec3::new(-25.0, -30.0, -5.0)),
        ModelPoint::new("right_molar", Vec3::new(25.0, -30.0, -5.0)),
        ModelPoint::new("chin", Vec3::new(0.0, -55.0, -15.0)),
    ]
}

fn maxillary_model() -> Vec<ModelPoint> {
    vec![
        ModelPoint::new("upper_incisor", Vec3::new(0.0, -35.0, 20.0)),
        ModelPoint::new("left_canine", Vec3::new(-20.0, -25.0, 18.0)),
        ModelPoint::new("right_canine", Vec3::new(20.0, -25.0, 18.0)),
        ModelPoint::new("palate", Vec3::new(0.0, -15.0, 30.0)),
    ]
}

fn noisy(pose: Pose, noise: &GaussianNoise, stream: usize, index: usize) -> Pose {
    Pose {
        position: noise.apply(stream, index, pose.position),
        ..pose
    }
}

/// Calibration recording: the tool travels to each landmark and rests on it
/// for [`DWELL`] frames, in `targets` order. Returns the streams and the dwell
/// ranges.
pub fn calibration_recording(
    targets: &[(bool, Vec3)],
    closed: &Iso3,
) -> (Vec<RigidBody>, Vec<FrameRange>) {
    let n = targets.len() * (TRAVEL + DWELL);
    let head = head_motion(n, RATE);
    let tip = Vec3::new(TIP.0, TIP.1, TIP.2);

    let mut hp = Vec::with_capacity(n);
    let mut mp = Vec::with_capacity(n);
    let mut ct = Vec::with_capacity(n);
    let mut dwell_ranges = Vec::with_capacity(targets.len());
    let mut previous = head[0] * Point3::new(60.0, 60.0, 60.0);

    for (k, (on_mandible, point)) in targets.iter().enumerate() {
        let start = k * (TRAVEL + DWELL);
        dwell_ranges.push(FrameRange::new(start + TRAVEL, start + TRAVEL + DWELL - 1));
        for j in 0..TRAVEL + DWELL {
            let i = start + j;
            let t = sample_time(i, RATE);
            let hp_pose = head[i];
            let mp_pose = hp_pose * closed;
            let body = if *on_mandible { mp_pose } else { hp_pose };
            let target = body * Point3::from(*point);
            let world = if j < TRAVEL {
                let s = j as f64 / TRAVEL as f64;
                previous + (target - previous) * s
            } else {
                target
            };
            let rotation = make_iso((0.4, -0.2 + 0.01 * k as f64, 0.3), (0.0, 0.0, 0.0)).rotation;
            let tool = Iso3::from_parts((world.coords - rotation * tip).into(), rotation);
            hp.push(Pose::from_iso(t, &hp_pose));
            mp.push(Pose::from_iso(t, &mp_pose));
            ct.push(Pose::from_iso(t, &tool));
            if j == TRAVEL + DWELL - 1 {
                previous = target;
            }
        }
    }
    (
        vec![
            RigidBody::from_poses("HP", hp),
            RigidBody::from_poses("MP", mp),
            RigidBody::from_poses("CT", ct),
        ],
        dwell_ranges,
    )
}

/// `samples` of rhythmic opening at 1 Hz with `sigma` position noise on
/// both markers.
pub fn scenario(samples: usize, sigma: f64) -> Scenario {
    let model_se3_hp = make_iso((0.1, -0.2, 0.3), (10.0, -5.0, 30.0));
    let model_se3_mp = make_iso((-0.05, 0.15, -0.1), (-3.0, 12.0, 8.0));
    let mandibular = mandibular_model();
    let maxillary = maxillary_model();

    let in_body = |model: &[ModelPoint], model_se3_body: &Iso3| -> Vec<Vec3> {
        model
            .iter()
            .map(|m| model_se3_body.inverse_transform_point(&Point3::from(m.position)).coords)
            .collect()
    };
    let mandibular_truth = in_body(&mandibular, &model_se3_mp);
    let maxillary_truth = in_body(&maxillary, &model_se3_hp);

    let targets: Vec<(bool, Vec3)> = mandibular_truth
        .iter()
        .map(|p| (true, *p))
        .chain(maxillary_truth.iter().map(|p| (false, *p)))
        .collect();
    let relative = jaw_motion(samples, RATE, 1.0);
    let (calibration_bodies, dwell) = calibration_recording(&targets, &relative[0]);

    let spec = |model: &[ModelPoint], ranges: &[FrameRange]| -> Vec<LandmarkSpec> {
        model
            .iter()
            .zip(ranges)
            .map(|(m, r)| LandmarkSpec::new(m.name.clone(), vec![*r]))
            .collect()
    };
    let landmarks = LandmarkPlan {
        mandibular: spec(&mandibular, &dwell[..mandibular.len()]),
        maxillary: spec(&maxillary, &dwell[mandibular.len()..]),
    };

    let noise = GaussianNoise::new(7, sigma);
    let head = head_motion(samples, RATE);
    let hp: Vec<Pose> = head
        .iter()
        .enumerate()
        .map(|(i, h)| noisy(Pose::from_iso(sample_time(i, RATE), h), &noise, 0, i))
        .collect();
    let mp: Vec<Pose> = head
        .iter()
        .zip(&relative)
        .enumerate()
        .map(|(i, (h, r))| noisy(Pose::from_iso(sample_time(i, RATE), &(h * r)), &noise, 1, i))
        .collect();

    Scenario {
        input: JawMotionInput {
            bodies: vec![RigidBody::from_poses("HP", hp), RigidBody::from_poses("MP", mp)],
            calibration_bodies: Some(calibration_bodies),
            tool_tip: Vec3::new(TIP.0, TIP.1, TIP.2),
            landmarks,
            model: ModelLandmarks {
                mandibular,
                maxillary,
            },
            operator_commands: Vec::new(),
        },
        model_se3_hp,
        model_se3_mp,
        relative,
        mandibular_truth,
        maxillary_truth,
    }
}

/// RMS translation error of `poses` against the expected model trajectory.
pub fn translation_rms(scenario: &Scenario, poses: &[Pose]) -> f64 {
    let sum: f64 = poses
        .iter()
        .enumerate()
        .map(|(i, p)| (p.position - scenario.expected(i).translation.vector).norm_squared())
        .sum();
    (sum / poses.len() as f64).sqrt()
}
