use anyhow::Result;
use jaw_tracking_core::synthetic::motion::{head_motion, jaw_motion, make_iso, poses_from_isos};
use jaw_tracking_core::{FrameRange, Iso3, ModelPoint, RigidBody, Vec3, pose_error};
use jaw_tracking_linear::{
    CoordinateTransformer, LandmarkRegistrar, LandmarkSpec, RegistrationError,
    RelativeMotionComputer, TipProbe,
};
use nalgebra::Point3;

const RATE: f64 = 100.0;
const HOLD: usize = 30;

fn model() -> Vec<ModelPoint> {
    vec![
        ModelPoint::new("lower_incisor", Vec3::new(0.0, -40.0, 10.0)),
        ModelPoint::new("left_molar", Vec3::new(-25.0, -30.0, -5.0)),
        ModelPoint::new("right_molar", Vec3::new(25.0, -30.0, -5.0)),
        ModelPoint::new("chin", Vec3::new(0.0, -55.0, -15.0)),
    ]
}

/// Body drifting with the head while the tool rests on each point for
/// `HOLD` frames.
fn touch_recording(points_in_body: &[Vec3], tip: Vec3) -> (RigidBody, RigidBody) {
    let n = points_in_body.len() * HOLD;
    let body = head_motion(n, RATE);
    let tool: Vec<Iso3> = body
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let point = points_in_body[i / HOLD];
            let world = b * Point3::from(point);
            let rotation = make_iso((0.3, 0.2 - 0.002 * i as f64, -0.1), (0.0, 0.0, 0.0)).rotation;
            Iso3::from_parts((world.coords - rotation * tip).into(), rotation)
        })
        .collect();
    (
        RigidBody::from_poses("MP", poses_from_isos(&body, RATE)),
        RigidBody::from_poses("CT", poses_from_isos(&tool, RATE)),
    )
}

#[test]
fn captured_landmarks_register_onto_model() -> Result<()> {
    let model_se3_mp = make_iso((0.2, -0.1, 0.4), (5.0, -12.0, 20.0));
    let model = model();
    let in_body: Vec<Vec3> = model
        .iter()
        .map(|m| model_se3_mp.inverse_transform_point(&Point3::from(m.position)).coords)
        .collect();
    let tip = Vec3::new(0.0, 0.0, -90.0);
    let (body, tool) = touch_recording(&in_body, tip);

    let specs: Vec<LandmarkSpec> = model
        .iter()
        .enumerate()
        .map(|(k, m)| {
            let hold = FrameRange::new(k * HOLD + 5, k * HOLD + HOLD - 1);
            LandmarkSpec::new(m.name.clone(), vec![hold])
        })
        .collect();
    let captured = TipProbe::new("CT", tip).capture_all(&specs, &body, &tool)?;
    let result = LandmarkRegistrar::register_landmarks(&captured, &model)?;

    let (dt, dr) = pose_error(&result.transform, &model_se3_mp);
    assert!(dt < 1e-9, "translation error {dt}");
    assert!(dr < 1e-9, "rotation error {dr}");
    assert!(result.rmse < 1e-9);

    let identity = result.transform * result.transform.inverse();
    let (dt, dr) = pose_error(&identity, &Iso3::identity());
    assert!(dt < 1e-9 && dr < 1e-9);
    Ok(())
}

#[test]
fn registration_rejects_collinear_landmarks() {
    let source = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(2.0, 2.0, 2.0),
    ];
    let target = source.iter().map(|p| p * 2.0 + Vec3::x()).collect::<Vec<_>>();
    assert!(LandmarkRegistrar::register(&source, &target).is_err());
    assert!(matches!(
        LandmarkRegistrar::register(&source[..2], &target[..2]),
        Err(RegistrationError::NotEnoughPoints(2))
    ));
}

#[test]
fn transform_chain_maps_relative_motion_into_model_frame() -> Result<()> {
    let n = 300;
    let head = head_motion(n, RATE);
    let relative = jaw_motion(n, RATE, 1.5);
    let jaw: Vec<Iso3> = head.iter().zip(&relative).map(|(h, r)| h * r).collect();
    let hp = RigidBody::from_poses("HP", poses_from_isos(&head, RATE));
    let mp = RigidBody::from_poses("MP", poses_from_isos(&jaw, RATE));

    let samples = RelativeMotionComputer::default().compute(&hp, &mp)?;
    let poses: Vec<_> = samples.iter().filter_map(|s| s.pose().copied()).collect();
    assert_eq!(poses.len(), n);

    let model_se3_hp = make_iso((0.1, 0.0, -0.2), (1.0, 2.0, 3.0));
    let model_se3_mp = make_iso((-0.3, 0.1, 0.05), (-4.0, 0.5, 7.0));
    let out = CoordinateTransformer::new()
        .then_left(model_se3_hp)
        .then_right(model_se3_mp.inverse())
        .apply(&poses)?;

    for (i, pose) in out.iter().enumerate() {
        let expected = model_se3_hp * relative[i] * model_se3_mp.inverse();
        let (dt, dr) = pose_error(&pose.to_iso(), &expected);
        assert!(dt < 1e-9 && dr < 1e-9, "sample {i}: {dt}, {dr}");
    }
    Ok(())
}
