//! Online landmark calibration.
//!
//! [`StabilityDetector`] judges a window of tip positions,
//! [`TriggerStrategy`] decides when to capture, and
//! [`CalibrationStateMachine`] sequences arming, capture, confirmation and
//! abort for one landmark. [`LandmarkCaptureSession`] repeats this over an
//! ordered landmark plan to build a calibration set.

mod capture_session;
mod config;
mod feedback;
mod stability;
mod state_machine;
mod trigger;

pub use capture_session::{
    BodyRoles, CaptureProgress, FrameSamples, LandmarkCaptureSession, LandmarkSet,
    PlannedLandmark,
};
pub use config::{CalibrationConfig, CalibrationMode, GuidedOrder, OnlineMethod};
pub use feedback::{FeedbackEvent, FeedbackSink, LogFeedback};
pub use stability::{StabilityDetector, StabilityMetric, StabilityReport};
pub use state_machine::{
    CalibrationError, CalibrationState, CalibrationStateMachine, CapturedLandmark,
    OperatorCommand, TipSample,
};
pub use trigger::{
    AutomaticTrigger, ButtonTrigger, CaptureTrigger, GuidedTrigger, TriggerEvent,
    TriggerStrategy,
};
