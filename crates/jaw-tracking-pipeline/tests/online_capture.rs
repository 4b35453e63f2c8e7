mod common;

use std::sync::mpsc;
use std::time::Duration;

use common::{DWELL, RATE, TRAVEL, calibration_recording, scenario};
use jaw_tracking_core::{BodyId, CalibrationSet, LandmarkSetError, Vec3};
use jaw_tracking_linear::TipProbe;
use jaw_tracking_pipeline::calibration::{
    BodyRoles, CalibrationConfig, CalibrationError, FeedbackEvent, LandmarkCaptureSession,
    LandmarkSet, OnlineMethod, OperatorCommand, PlannedLandmark,
};
use jaw_tracking_pipeline::source::{
    ChannelSource, RecordedSource, ScheduledCommand, ScheduledCommands, run_online_capture,
};

fn plan(s: &common::Scenario) -> Vec<PlannedLandmark> {
    let landmarks = &s.input.landmarks;
    landmarks
        .mandibular
        .iter()
        .map(|l| PlannedLandmark::new(l.name.clone(), LandmarkSet::Mandibular))
        .chain(
            landmarks
                .maxillary
                .iter()
                .map(|l| PlannedLandmark::new(l.name.clone(), LandmarkSet::Maxillary)),
        )
        .collect()
}

fn config(method: OnlineMethod) -> CalibrationConfig {
    CalibrationConfig {
        method,
        stability_threshold: 0.2,
        stability_duration: 0.1,
        capture_window: 0.05,
        ..CalibrationConfig::default()
    }
}

fn probe(s: &common::Scenario) -> TipProbe {
    TipProbe::new("CT", s.input.tool_tip)
}

fn assert_matches_truth(s: &common::Scenario, set: &CalibrationSet) {
    let captured: Vec<Vec3> = set
        .mandibular()
        .iter()
        .chain(set.maxillary())
        .map(|l| l.captured_position)
        .collect();
    let truth: Vec<Vec3> = s
        .mandibular_truth
        .iter()
        .chain(&s.maxillary_truth)
        .copied()
        .collect();
    assert_eq!(captured.len(), truth.len());
    for (c, t) in captured.iter().zip(&truth) {
        assert!((c - t).norm() < 1e-9, "captured {c:?}, expected {t:?}");
    }
}

#[test]
fn live_channel_capture_matches_touched_points() {
    let s = scenario(10, 0.0);
    let roles = BodyRoles::default();
    let mut streams = s.input.calibration_streams().to_vec();
    // A rigid body nobody asks for, streamed alongside the tracked ones.
    let mut extra = streams[0].clone();
    extra.id = BodyId::new("WAND");
    streams.push(extra);
    let (producer, mut source) =
        ChannelSource::replay(streams, roles.ids(), 16, Duration::from_secs(5));

    let mut capture = LandmarkCaptureSession::with_feedback(
        plan(&s),
        probe(&s),
        &config(OnlineMethod::Automatic),
        RATE,
        Vec::<FeedbackEvent>::new(),
    )
    .unwrap();
    let set = run_online_capture(&mut source, &mut (), &roles, &mut capture).unwrap();
    assert_eq!(source.pending(&BodyId::new("WAND")), 0);
    for id in roles.ids() {
        assert!(source.pending(&id) <= 16, "{id} backlog {}", source.pending(&id));
    }
    drop(source);
    producer.join().unwrap();

    assert_matches_truth(&s, &set);
    let captured_events = capture
        .machine()
        .feedback()
        .iter()
        .filter(|e| matches!(e, FeedbackEvent::Captured { .. }))
        .count();
    assert_eq!(captured_events, 8);
}

#[test]
fn button_capture_with_confirmation() {
    let s = scenario(10, 0.0);
    let mut commands = Vec::new();
    for k in 0..8 {
        let dwell = k * (TRAVEL + DWELL) + TRAVEL;
        commands.push(ScheduledCommand {
            frame: dwell + 2,
            command: OperatorCommand::Trigger,
        });
        commands.push(ScheduledCommand {
            frame: dwell + 20,
            command: OperatorCommand::Accept,
        });
    }
    let mut commands = ScheduledCommands::new(commands);
    let mut source = RecordedSource::new(s.input.calibration_streams().iter().cloned());
    let mut cfg = config(OnlineMethod::ButtonTriggered);
    cfg.require_confirmation = true;
    let mut capture = LandmarkCaptureSession::new(plan(&s), probe(&s), &cfg, RATE).unwrap();

    let set =
        run_online_capture(&mut source, &mut commands, &BodyRoles::default(), &mut capture).unwrap();
    assert_matches_truth(&s, &set);
    let first = &set.mandibular()[0];
    assert_eq!(first.intervals[0].start, TRAVEL + 3);
    assert_eq!(first.intervals[0].len(), 10);
}

#[test]
fn cancel_from_operator_channel_leaves_no_calibration() {
    let s = scenario(10, 0.0);
    let (tx, mut rx) = mpsc::channel();
    let mut source = RecordedSource::new(s.input.calibration_streams().iter().cloned());
    let mut capture =
        LandmarkCaptureSession::new(plan(&s), probe(&s), &config(OnlineMethod::Automatic), RATE)
            .unwrap();
    tx.send(OperatorCommand::Cancel).unwrap();

    let err = run_online_capture(&mut source, &mut rx, &BodyRoles::default(), &mut capture)
        .unwrap_err();
    match err.downcast_ref::<CalibrationError>() {
        Some(CalibrationError::Cancelled { landmark }) => assert_eq!(landmark, "lower_incisor"),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(capture.calibration().is_none());
}

#[test]
fn stream_end_before_trigger_is_reported() {
    let s = scenario(10, 0.0);
    let mut source = RecordedSource::new(s.input.calibration_streams().iter().cloned());
    let mut capture = LandmarkCaptureSession::new(
        plan(&s),
        probe(&s),
        &config(OnlineMethod::ButtonTriggered),
        RATE,
    )
    .unwrap();

    let err = run_online_capture(&mut source, &mut (), &BodyRoles::default(), &mut capture)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CalibrationError>(),
        Some(CalibrationError::StreamEnded { .. })
    ));
    assert!(format!("{err:#}").contains("lower_incisor"));
    assert!(capture.calibration().is_none());
}

#[test]
fn collinear_maxillary_set_is_recaptured() {
    let s = scenario(10, 0.0);
    let x = &s.maxillary_truth;
    let collinear = x[1] * 2.0 - x[0];
    // The third maxillary touch lands on the line through the first two; the
    // operator then touches the right point.
    let targets: Vec<(bool, Vec3)> = s
        .mandibular_truth
        .iter()
        .map(|p| (true, *p))
        .chain([x[0], x[1], collinear, x[2]].into_iter().map(|p| (false, p)))
        .collect();
    let (streams, _) = calibration_recording(&targets, &s.relative[0]);
    let plan: Vec<PlannedLandmark> = plan(&s).into_iter().take(7).collect();
    let roles = BodyRoles::default();
    let mut source = RecordedSource::new(streams);
    let mut capture =
        LandmarkCaptureSession::new(plan, probe(&s), &config(OnlineMethod::Automatic), RATE)
            .unwrap();

    let err = run_online_capture(&mut source, &mut (), &roles, &mut capture).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CalibrationError>(),
        Some(CalibrationError::Landmarks(LandmarkSetError::Degenerate { .. }))
    ));
    assert!(format!("{err:#}").contains("capturing landmark `right_canine`"));
    assert!(capture.calibration().is_none());

    capture.restart_current().unwrap();
    let set = run_online_capture(&mut source, &mut (), &roles, &mut capture).unwrap();
    assert_eq!(set.mandibular().len(), 4);
    assert_eq!(set.maxillary().len(), 3);
    for (lm, truth) in set.mandibular().iter().zip(&s.mandibular_truth) {
        assert!((lm.captured_position - truth).norm() < 1e-9);
    }
    for (lm, truth) in set.maxillary().iter().zip(&x[..3]) {
        assert!((lm.captured_position - truth).norm() < 1e-9);
    }
}
