//! Intermediate results of the jaw motion pipeline.

use jaw_tracking_core::{CalibrationSet, Pose};
use jaw_tracking_linear::RegistrationResult;
use jaw_tracking_signal::CombinedSegments;
use serde::{Deserialize, Serialize};

/// By-products of the individual steps.
///
/// Every field is owned by exactly one step; re-running a step clears the
/// fields of the steps after it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JawMotionState {
    // ─────────────────────────────────────────────────────────────────────────
    // Calibration and registration
    // ─────────────────────────────────────────────────────────────────────────
    /// Captured landmarks; immutable until recalibration is requested.
    pub calibration: Option<CalibrationSet>,

    /// `model_se3_MP` from the mandibular landmarks.
    pub mandibular_registration: Option<RegistrationResult>,

    /// `model_se3_HP` from the maxillary landmarks.
    pub maxillary_registration: Option<RegistrationResult>,

    // ─────────────────────────────────────────────────────────────────────────
    // Motion processing
    // ─────────────────────────────────────────────────────────────────────────
    /// `HP_se3_MP(t)` with short gaps filled.
    pub relative_motion: Option<Vec<Pose>>,

    /// Number of samples filled in `relative_motion`.
    pub filled_samples: usize,

    /// Relative motion in model coordinates, re-origined if configured.
    pub transformed: Option<Vec<Pose>>,

    /// Selected sub-experiments joined in order.
    pub segments: Option<CombinedSegments>,

    pub smoothed: Option<Vec<Pose>>,
}

impl JawMotionState {
    pub fn clear_registration(&mut self) {
        self.mandibular_registration = None;
        self.maxillary_registration = None;
        self.clear_transformed();
    }

    pub fn clear_motion(&mut self) {
        self.relative_motion = None;
        self.filled_samples = 0;
        self.clear_transformed();
    }

    pub fn clear_transformed(&mut self) {
        self.transformed = None;
        self.clear_segments();
    }

    pub fn clear_segments(&mut self) {
        self.segments = None;
        self.smoothed = None;
    }

    pub fn is_registered(&self) -> bool {
        self.mandibular_registration.is_some() && self.maxillary_registration.is_some()
    }
}
