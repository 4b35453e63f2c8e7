//! Jaw motion analysis pipeline.
//!
//! Captures mandibular and maxillary landmarks, registers them to the
//! anatomical model, and turns the recorded head (`HP`) and mandible (`MP`)
//! marker streams into a smoothed mandible trajectory in model coordinates
//! with velocity and acceleration channels.
//!
//! Steps, in order:
//! [`step_calibrate`] → [`step_register`] → [`step_relative_motion`] →
//! [`step_transform`] → [`step_segment`] → [`step_smooth`] →
//! [`step_derivatives`]. [`run_analysis`] runs all of them.

mod problem;
mod state;
mod steps;

pub use problem::{
    JawMotionConfig, JawMotionExport, JawMotionInput, JawMotionOutput, JawMotionProblem,
    LandmarkPlan, ModelLandmarks, Provenance, SmoothingConfig, TransformConfig,
};
pub use state::JawMotionState;
pub use steps::{
    CalibrateOptions, RegisterOptions, run_analysis, step_calibrate, step_derivatives,
    step_register, step_relative_motion, step_segment, step_smooth, step_transform,
};
