//! [`ProblemType`] implementation for jaw motion analysis.

use std::collections::HashSet;

use anyhow::{Result, anyhow, ensure};
use jaw_tracking_core::{
    BodyId, ConfigurationError, Iso3, ModelPoint, Real, RigidBody, Trajectory, Vec3, ensure_config,
};
use jaw_tracking_linear::{DEFAULT_SYNC_EPSILON, LandmarkSpec};
use jaw_tracking_signal::{SegmentSpan, SubExperiment};
use serde::{Deserialize, Serialize};

use crate::calibration::{BodyRoles, CalibrationConfig, CalibrationMode, OnlineMethod};
use crate::session::{InvalidationPolicy, ProblemType};
use crate::source::ScheduledCommand;

use super::state::JawMotionState;

/// Jaw motion analysis problem (head + mandible markers, calibration tool).
#[derive(Debug)]
pub struct JawMotionProblem;

/// Largest relative difference between `1 / sample_rate` and the median
/// timestamp spacing of a recorded stream.
pub const SAMPLE_RATE_TOLERANCE: Real = 0.01;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Odd number of samples per fit.
    pub window_length: usize,
    pub poly_order: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_length: 11,
            poly_order: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Sample whose pose becomes the origin of the output trajectory.
    pub anchor_index: Option<usize>,
}

/// Configuration for jaw motion analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JawMotionConfig {
    /// Tracking rate of every stream (Hz).
    pub sample_rate: Real,
    /// Length unit of positions, carried into the trajectory.
    pub unit: String,
    pub bodies: BodyRoles,
    pub calibration: CalibrationConfig,
    /// Maximum timestamp difference between paired samples (s).
    pub sync_epsilon: Real,
    /// Longest run of occluded samples that is interpolated.
    pub max_gap_frames: usize,
    pub transform: TransformConfig,
    pub sub_experiments: Vec<SubExperiment>,
    /// Sub-experiments to join, in output order. Empty selects all in
    /// declaration order.
    pub combine_order: Vec<String>,
    pub smoothing: SmoothingConfig,
    /// Highest derivative computed (0 disables derivatives).
    pub derivative_order: u32,
}

impl Default for JawMotionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 200.0,
            unit: "mm".to_string(),
            bodies: BodyRoles::default(),
            calibration: CalibrationConfig::default(),
            sync_epsilon: DEFAULT_SYNC_EPSILON,
            max_gap_frames: 20,
            transform: TransformConfig::default(),
            sub_experiments: Vec::new(),
            combine_order: Vec::new(),
            smoothing: SmoothingConfig::default(),
            derivative_order: 2,
        }
    }
}

impl JawMotionConfig {
    /// Check every parameter before any processing starts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure_config!(
            self.sample_rate.is_finite() && self.sample_rate > 0.0,
            "sample_rate",
            "must be positive, got {}",
            self.sample_rate
        );
        ensure_config!(!self.unit.trim().is_empty(), "unit", "must not be empty");
        ensure_config!(
            self.sync_epsilon.is_finite() && self.sync_epsilon >= 0.0,
            "sync_epsilon",
            "must be non-negative, got {}",
            self.sync_epsilon
        );
        let roles = [&self.bodies.reference, &self.bodies.moving, &self.bodies.tool];
        let distinct: HashSet<&BodyId> = roles.iter().copied().collect();
        ensure_config!(
            distinct.len() == roles.len(),
            "bodies",
            "reference, moving and tool must be different bodies"
        );
        self.calibration.validate()?;

        if self.smoothing.enabled {
            let SmoothingConfig {
                window_length,
                poly_order,
                ..
            } = self.smoothing;
            ensure_config!(
                window_length % 2 == 1,
                "smoothing.window_length",
                "must be odd, got {}",
                window_length
            );
            ensure_config!(
                poly_order < window_length,
                "smoothing.poly_order",
                "{} must be smaller than window_length {}",
                poly_order,
                window_length
            );
        }

        let mut names = HashSet::new();
        for sub in &self.sub_experiments {
            ensure_config!(
                names.insert(sub.name.as_str()),
                "sub_experiments",
                "duplicate sub-experiment `{}`",
                sub.name
            );
            ensure_config!(
                !sub.ranges.is_empty(),
                "sub_experiments",
                "sub-experiment `{}` has no frame range",
                sub.name
            );
        }
        for name in &self.combine_order {
            ensure_config!(
                names.contains(name.as_str()),
                "combine_order",
                "unknown sub-experiment `{}`",
                name
            );
        }
        Ok(())
    }

    /// Names joined by the segmentation step, in order.
    pub fn selected_sub_experiments(&self) -> Vec<String> {
        if self.combine_order.is_empty() {
            self.sub_experiments.iter().map(|s| s.name.clone()).collect()
        } else {
            self.combine_order.clone()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

/// Landmarks to capture, per landmark set, in capture order.
///
/// Frame intervals are used by offline calibration only; online capture
/// needs just the names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPlan {
    pub mandibular: Vec<LandmarkSpec>,
    pub maxillary: Vec<LandmarkSpec>,
}

/// Landmark coordinates in the anatomical model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelLandmarks {
    pub mandibular: Vec<ModelPoint>,
    pub maxillary: Vec<ModelPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JawMotionInput {
    /// Recorded motion streams.
    pub bodies: Vec<RigidBody>,
    /// Streams recorded during calibration; the motion streams when absent.
    #[serde(default)]
    pub calibration_bodies: Option<Vec<RigidBody>>,
    /// Calibration tool tip in the tool frame.
    pub tool_tip: Vec3,
    pub landmarks: LandmarkPlan,
    pub model: ModelLandmarks,
    /// Operator commands replayed during online calibration.
    #[serde(default)]
    pub operator_commands: Vec<ScheduledCommand>,
}

impl JawMotionInput {
    pub fn body(&self, id: &BodyId) -> Option<&RigidBody> {
        self.bodies.iter().find(|b| &b.id == id)
    }

    pub fn calibration_streams(&self) -> &[RigidBody] {
        self.calibration_bodies.as_deref().unwrap_or(&self.bodies)
    }

    pub fn calibration_body(&self, id: &BodyId) -> Option<&RigidBody> {
        self.calibration_streams().iter().find(|b| &b.id == id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters and quality figures that produced an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub calibration_mode: CalibrationMode,
    pub online_method: Option<OnlineMethod>,
    pub stability_threshold: Real,
    pub stability_duration: Real,
    pub capture_window: Real,
    pub require_confirmation: bool,
    pub mandibular_rmse: Real,
    pub maxillary_rmse: Real,
    pub filled_samples: usize,
    pub anchor_index: Option<usize>,
    pub sub_experiments: Vec<SegmentSpan>,
    /// `None` when smoothing was disabled.
    pub smoothing: Option<SmoothingConfig>,
    pub derivative_order: u32,
}

/// Final trajectory with the calibration it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JawMotionOutput {
    /// Mandible pose in maxillary model coordinates.
    pub trajectory: Trajectory,
    /// `model_se3_HP` (maxillary registration).
    pub model_se3_reference: Iso3,
    /// `model_se3_MP` (mandibular registration).
    pub model_se3_moving: Iso3,
    pub provenance: Provenance,
}

pub type JawMotionExport = JawMotionOutput;

impl ProblemType for JawMotionProblem {
    type Config = JawMotionConfig;
    type Input = JawMotionInput;
    type State = JawMotionState;
    type Output = JawMotionOutput;
    type Export = JawMotionExport;

    fn name() -> &'static str {
        "jaw_motion"
    }

    fn validate_input(input: &Self::Input) -> Result<()> {
        ensure!(!input.bodies.is_empty(), "no recorded body streams");
        let mut ids = HashSet::new();
        for body in &input.bodies {
            ensure!(ids.insert(&body.id), "duplicate body stream {}", body.id);
            ensure!(!body.is_empty(), "body {} has no samples", body.id);
        }
        for (set, model) in [
            ("mandibular", &input.model.mandibular),
            ("maxillary", &input.model.maxillary),
        ] {
            ensure!(
                model.len() >= 3,
                "{set} model needs at least 3 points, got {}",
                model.len()
            );
        }
        ensure!(
            input.tool_tip.iter().all(|v| v.is_finite()),
            "tool tip offset is not finite"
        );
        Ok(())
    }

    fn validate_config(config: &Self::Config) -> Result<()> {
        config.validate()?;
        Ok(())
    }

    fn validate_input_config(input: &Self::Input, config: &Self::Config) -> Result<()> {
        for id in [&config.bodies.reference, &config.bodies.moving] {
            ensure!(input.body(id).is_some(), "no motion stream for body {id}");
        }
        for id in [&config.bodies.reference, &config.bodies.moving, &config.bodies.tool] {
            ensure!(
                input.calibration_body(id).is_some(),
                "no calibration stream for body {id}"
            );
        }
        let expected = 1.0 / config.sample_rate;
        for body in input.bodies.iter().chain(input.calibration_bodies.iter().flatten()) {
            let Some(dt) = body.median_interval() else {
                continue;
            };
            if (dt - expected).abs() > SAMPLE_RATE_TOLERANCE * expected {
                return Err(ConfigurationError::new(
                    "sample_rate",
                    format!(
                        "{} Hz does not match body {} (median spacing {dt:.6} s, {:.3} Hz)",
                        config.sample_rate,
                        body.id,
                        1.0 / dt
                    ),
                )
                .into());
            }
        }
        for (set, specs, model) in [
            ("mandibular", &input.landmarks.mandibular, &input.model.mandibular),
            ("maxillary", &input.landmarks.maxillary, &input.model.maxillary),
        ] {
            for spec in specs {
                model
                    .iter()
                    .find(|m| m.name == spec.name)
                    .ok_or_else(|| anyhow!("{set} landmark `{}` has no model point", spec.name))?;
            }
        }
        if let Some(anchor) = config.transform.anchor_index {
            let len = input
                .body(&config.bodies.reference)
                .map_or(0, RigidBody::len);
            ensure!(
                anchor < len,
                "anchor_index {anchor} is outside the recording ({len} samples)"
            );
        }
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn export(output: &Self::Output, _config: &Self::Config) -> Result<Self::Export> {
        Ok(output.clone())
    }
}
