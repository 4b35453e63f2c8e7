//! Landmark calibration and jaw motion analysis pipelines.
//!
//! ## Session API
//!
//! ```no_run
//! use jaw_tracking_pipeline::session::AnalysisSession;
//! use jaw_tracking_pipeline::jaw_motion::{JawMotionProblem, run_analysis};
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//!
//! let mut session = AnalysisSession::<JawMotionProblem>::new();
//! session.set_input(input)?;
//! run_analysis(&mut session, None)?;
//!
//! let export = session.export()?;
//! println!("{} samples", export.trajectory.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming capture
//!
//! [`calibration`] holds the capture state machine and its trigger
//! strategies. [`source`] feeds it from recorded or live pose streams and
//! polls operator commands once per packet cycle.

pub mod calibration;
pub mod jaw_motion;
pub mod session;
pub mod source;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::session::{
    AnalysisSession, ExportRecord, InvalidationPolicy, LogEntry, ProblemType, SessionMetadata,
};

pub use crate::calibration::{
    CalibrationConfig, CalibrationError, CalibrationMode, CalibrationState,
    CalibrationStateMachine, GuidedOrder, LandmarkCaptureSession, OnlineMethod, OperatorCommand,
    StabilityDetector, TriggerStrategy,
};

pub use crate::jaw_motion::{
    JawMotionConfig, JawMotionExport, JawMotionInput, JawMotionOutput, JawMotionProblem,
    JawMotionState, run_analysis,
};

pub use crate::source::{
    ChannelSource, CommandSource, PoseEvent, PoseSource, RecordedSource, ScheduledCommand,
    ScheduledCommands, run_online_capture,
};
