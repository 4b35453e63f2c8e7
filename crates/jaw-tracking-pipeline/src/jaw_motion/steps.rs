//! Step functions for jaw motion analysis.

use anyhow::{Context, Result, anyhow, ensure};
use jaw_tracking_core::{BodyId, CalibrationSet, Pose, RigidBody, Trajectory};
use jaw_tracking_linear::{
    CoordinateTransformer, LandmarkRegistrar, RegistrationResult, RelativeMotionComputer, TipProbe,
};
use jaw_tracking_signal::{
    CombinedSegments, DerivativeEstimator, SubExperimentSegmenter, TemporalSmoother, fill_gaps,
};
use log::{info, warn};

use crate::calibration::{
    CalibrationMode, LandmarkCaptureSession, LandmarkSet, PlannedLandmark,
};
use crate::session::AnalysisSession;
use crate::source::{RecordedSource, ScheduledCommands, run_online_capture};

use super::problem::{JawMotionConfig, JawMotionInput, JawMotionOutput, JawMotionProblem, Provenance};

// ─────────────────────────────────────────────────────────────────────────────
// Step Options
// ─────────────────────────────────────────────────────────────────────────────

/// Options for the calibration step.
#[derive(Debug, Clone, Default)]
pub struct CalibrateOptions {
    /// Capture again even if the session already holds a calibration.
    pub recalibrate: bool,
}

/// Options for the registration step.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Fail when either registration's RMS residual exceeds this value.
    pub max_rmse: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

type Session = AnalysisSession<JawMotionProblem>;

fn motion_body<'a>(input: &'a JawMotionInput, id: &BodyId) -> Result<&'a RigidBody> {
    input
        .body(id)
        .ok_or_else(|| anyhow!("no motion stream for body {id}"))
}

fn calibration_body<'a>(input: &'a JawMotionInput, id: &BodyId) -> Result<&'a RigidBody> {
    input
        .calibration_body(id)
        .ok_or_else(|| anyhow!("no calibration stream for body {id}"))
}

fn capture_offline(input: &JawMotionInput, config: &JawMotionConfig) -> Result<CalibrationSet> {
    let roles = &config.bodies;
    let probe =
        TipProbe::new(roles.tool.clone(), input.tool_tip).with_sync_epsilon(config.sync_epsilon);
    let tool = calibration_body(input, &roles.tool)?;

    let moving = calibration_body(input, &roles.moving)?;
    let mandibular = probe
        .capture_all(&input.landmarks.mandibular, moving, tool)
        .with_context(|| format!("mandibular landmarks in {}", roles.moving))?;

    let reference = calibration_body(input, &roles.reference)?;
    let maxillary = probe
        .capture_all(&input.landmarks.maxillary, reference, tool)
        .with_context(|| format!("maxillary landmarks in {}", roles.reference))?;

    Ok(CalibrationSet::new(mandibular, maxillary)?)
}

fn capture_online(input: &JawMotionInput, config: &JawMotionConfig) -> Result<CalibrationSet> {
    let plan: Vec<PlannedLandmark> = input
        .landmarks
        .mandibular
        .iter()
        .map(|s| PlannedLandmark::new(s.name.clone(), LandmarkSet::Mandibular))
        .chain(
            input
                .landmarks
                .maxillary
                .iter()
                .map(|s| PlannedLandmark::new(s.name.clone(), LandmarkSet::Maxillary)),
        )
        .collect();
    let probe = TipProbe::new(config.bodies.tool.clone(), input.tool_tip);
    let mut capture =
        LandmarkCaptureSession::new(plan, probe, &config.calibration, config.sample_rate)?;
    let mut source = RecordedSource::new(input.calibration_streams().iter().cloned());
    let mut commands = ScheduledCommands::new(input.operator_commands.clone());
    run_online_capture(&mut source, &mut commands, &config.bodies, &mut capture)
}

fn register_both(
    calibration: &CalibrationSet,
    input: &JawMotionInput,
    opts: &RegisterOptions,
) -> Result<(RegistrationResult, RegistrationResult)> {
    let mandibular =
        LandmarkRegistrar::register_landmarks(calibration.mandibular(), &input.model.mandibular)
            .context("mandibular registration failed")?;
    let maxillary =
        LandmarkRegistrar::register_landmarks(calibration.maxillary(), &input.model.maxillary)
            .context("maxillary registration failed")?;

    if let Some(limit) = opts.max_rmse {
        for (set, result) in [("mandibular", &mandibular), ("maxillary", &maxillary)] {
            ensure!(
                result.rmse <= limit,
                "{set} registration rmse {:.4} exceeds {limit}",
                result.rmse
            );
        }
    }
    Ok((mandibular, maxillary))
}

/// Gap-filled `HP_se3_MP` and the number of filled samples.
fn relative_poses(input: &JawMotionInput, config: &JawMotionConfig) -> Result<(Vec<Pose>, usize)> {
    let reference = motion_body(input, &config.bodies.reference)?;
    let moving = motion_body(input, &config.bodies.moving)?;

    let samples = RelativeMotionComputer::new(config.sync_epsilon)
        .compute(reference, moving)
        .with_context(|| format!("relative motion of {} in {}", moving.id, reference.id))?;
    let gaps = samples.iter().filter(|s| s.is_gap()).count();
    let poses = fill_gaps(&samples, config.max_gap_frames)
        .with_context(|| format!("filling occlusions of {} / {}", moving.id, reference.id))?;
    if gaps > 0 {
        warn!("filled {gaps} occluded samples of {}", moving.id);
    }
    Ok((poses, gaps))
}

fn registration<'a>(
    result: &'a Option<RegistrationResult>,
    set: &str,
) -> Result<&'a RegistrationResult> {
    result
        .as_ref()
        .ok_or_else(|| anyhow!("{set} registration required before this step"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Step Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Capture the mandibular and maxillary landmark sets.
///
/// Offline mode averages the tool tip over the recorded frame intervals;
/// online mode replays the calibration streams through the capture state
/// machine. An existing calibration is kept unless `recalibrate` is set.
pub fn step_calibrate(session: &mut Session, opts: Option<CalibrateOptions>) -> Result<()> {
    session.validate()?;
    let opts = opts.unwrap_or_default();
    if session.state.calibration.is_some() && !opts.recalibrate {
        info!("keeping existing calibration");
        return Ok(());
    }
    let input = session.require_input()?;
    let config = &session.config;

    let captured = match config.calibration.mode {
        CalibrationMode::Offline => capture_offline(input, config),
        CalibrationMode::Online => capture_online(input, config),
    }
    .context("calibration failed");
    let calibration = match captured {
        Ok(c) => c,
        Err(e) => {
            session.log_failure("calibrate", format!("{e:#}"));
            return Err(e);
        }
    };

    let notes = format!(
        "{:?}: {} mandibular, {} maxillary landmarks",
        config.calibration.mode,
        calibration.mandibular().len(),
        calibration.maxillary().len()
    );
    session.state.calibration = Some(calibration);
    session.state.clear_registration();
    session.log_success_with_notes("calibrate", notes);
    Ok(())
}

/// Register both landmark sets onto the model.
pub fn step_register(session: &mut Session, opts: Option<RegisterOptions>) -> Result<()> {
    session.validate()?;
    let input = session.require_input()?;
    let calibration = session
        .state
        .calibration
        .as_ref()
        .ok_or_else(|| anyhow!("calibration required before registration"))?;
    let opts = opts.unwrap_or_default();

    let (mandibular, maxillary) = match register_both(calibration, input, &opts) {
        Ok(r) => r,
        Err(e) => {
            session.log_failure("register", format!("{e:#}"));
            return Err(e);
        }
    };
    info!(
        "registration rmse: mandibular {:.4}, maxillary {:.4}",
        mandibular.rmse, maxillary.rmse
    );

    let notes = format!(
        "rmse mandibular={:.4}, maxillary={:.4}",
        mandibular.rmse, maxillary.rmse
    );
    session.state.mandibular_registration = Some(mandibular);
    session.state.maxillary_registration = Some(maxillary);
    session.state.clear_transformed();
    session.log_success_with_notes("register", notes);
    Ok(())
}

/// Mandible motion relative to the head body, with short gaps filled.
pub fn step_relative_motion(session: &mut Session) -> Result<()> {
    session.validate()?;
    let input = session.require_input()?;
    let config = &session.config;
    let (poses, gaps) = match relative_poses(input, config) {
        Ok(r) => r,
        Err(e) => {
            session.log_failure("relative_motion", format!("{e:#}"));
            return Err(e);
        }
    };

    let notes = format!("{} samples, {} filled", poses.len(), gaps);
    session.state.relative_motion = Some(poses);
    session.state.filled_samples = gaps;
    session.state.clear_transformed();
    session.log_success_with_notes("relative_motion", notes);
    Ok(())
}

/// Express the relative motion in model coordinates.
///
/// `model_se3_HP · HP_se3_MP(t) · (model_se3_MP)⁻¹`, then re-origined to the
/// configured anchor sample.
pub fn step_transform(session: &mut Session) -> Result<()> {
    let state = &session.state;
    let reference = registration(&state.maxillary_registration, "maxillary")?;
    let moving = registration(&state.mandibular_registration, "mandibular")?;
    let relative = state
        .relative_motion
        .as_ref()
        .ok_or_else(|| anyhow!("relative motion required before transform"))?;

    let transformer = CoordinateTransformer::new()
        .then_left(reference.transform)
        .then_right(moving.transform.inverse())
        .with_anchor(session.config.transform.anchor_index);
    let transformed = transformer
        .apply(relative)
        .context("transform to model coordinates failed")?;

    let notes = match transformer.anchor() {
        Some(anchor) => format!("{} samples, anchored at {anchor}", transformed.len()),
        None => format!("{} samples", transformed.len()),
    };
    session.state.transformed = Some(transformed);
    session.state.clear_segments();
    session.log_success_with_notes("transform", notes);
    Ok(())
}

/// Join the selected sub-experiments; the whole recording when none are
/// configured.
pub fn step_segment(session: &mut Session) -> Result<()> {
    let poses = session
        .state
        .transformed
        .as_ref()
        .ok_or_else(|| anyhow!("transform required before segmentation"))?;
    let config = &session.config;

    let combined = if config.sub_experiments.is_empty() {
        CombinedSegments {
            poses: poses.clone(),
            spans: Vec::new(),
        }
    } else {
        let order = config.selected_sub_experiments();
        SubExperimentSegmenter::new(config.sample_rate, config.sub_experiments.clone())?
            .combine(poses, &order)
            .with_context(|| format!("combining sub-experiments {order:?}"))?
    };

    let notes = format!("{} samples, {} segments", combined.poses.len(), combined.spans.len());
    session.state.segments = Some(combined);
    session.state.smoothed = None;
    session.log_success_with_notes("segment", notes);
    Ok(())
}

/// Savitzky–Golay smoothing of the segmented trajectory.
pub fn step_smooth(session: &mut Session) -> Result<()> {
    let segments = session
        .state
        .segments
        .as_ref()
        .ok_or_else(|| anyhow!("segmentation required before smoothing"))?;
    let smoothing = &session.config.smoothing;

    let smoothed: Vec<Pose> = if smoothing.enabled {
        TemporalSmoother::new(smoothing.window_length, smoothing.poly_order)?
            .smooth(&segments.poses)
            .context("smoothing failed")?
    } else {
        segments.poses.clone()
    };

    let notes = if smoothing.enabled {
        format!(
            "window={}, order={}",
            smoothing.window_length, smoothing.poly_order
        )
    } else {
        "disabled".to_string()
    };
    session.state.smoothed = Some(smoothed);
    session.log_success_with_notes("smooth", notes);
    Ok(())
}

/// Build the trajectory with derivative channels and set the output.
pub fn step_derivatives(session: &mut Session) -> Result<()> {
    let state = &session.state;
    let config = &session.config;
    let reference = registration(&state.maxillary_registration, "maxillary")?;
    let moving = registration(&state.mandibular_registration, "mandibular")?;
    let poses = state
        .smoothed
        .clone()
        .ok_or_else(|| anyhow!("smoothing required before derivatives"))?;
    let spans = state
        .segments
        .as_ref()
        .map(|s| s.spans.clone())
        .unwrap_or_default();

    let mut trajectory = Trajectory::new(poses, config.sample_rate, config.unit.clone())?;
    DerivativeEstimator::new(config.derivative_order)
        .apply(&mut trajectory)
        .context("derivative estimation failed")?;

    let calibration = &config.calibration;
    let provenance = Provenance {
        calibration_mode: calibration.mode,
        online_method: (calibration.mode == CalibrationMode::Online).then_some(calibration.method),
        stability_threshold: calibration.stability_threshold,
        stability_duration: calibration.stability_duration,
        capture_window: calibration.capture_window,
        require_confirmation: calibration.require_confirmation,
        mandibular_rmse: moving.rmse,
        maxillary_rmse: reference.rmse,
        filled_samples: state.filled_samples,
        anchor_index: config.transform.anchor_index,
        sub_experiments: spans,
        smoothing: config.smoothing.enabled.then(|| config.smoothing.clone()),
        derivative_order: config.derivative_order,
    };
    let output = JawMotionOutput {
        model_se3_reference: reference.transform,
        model_se3_moving: moving.transform,
        provenance,
        trajectory,
    };

    let notes = format!(
        "{} samples over {:.3} s, {} derivative channels",
        output.trajectory.len(),
        output.trajectory.duration(),
        output.trajectory.derivatives().len()
    );
    session.set_output(output);
    session.log_success_with_notes("derivatives", notes);
    Ok(())
}

/// Run the full pipeline: calibrate → register → relative motion →
/// transform → segment → smooth → derivatives.
pub fn run_analysis(session: &mut Session, config: Option<JawMotionConfig>) -> Result<()> {
    if let Some(cfg) = config {
        session.set_config(cfg)?;
    }
    step_calibrate(session, None)?;
    step_register(session, None)?;
    step_relative_motion(session)?;
    step_transform(session)?;
    step_segment(session)?;
    step_smooth(session)?;
    step_derivatives(session)?;
    Ok(())
}
