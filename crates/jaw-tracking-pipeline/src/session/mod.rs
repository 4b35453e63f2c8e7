//! Analysis session framework.
//!
//! A session is a mutable container holding configuration, input streams,
//! intermediate state and one final output. Step functions mutate it in
//! place, so a pipeline can be run step by step or all at once.
//!
//! ```no_run
//! use jaw_tracking_pipeline::session::AnalysisSession;
//! use jaw_tracking_pipeline::jaw_motion::{JawMotionProblem, step_calibrate, step_register};
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//!
//! let mut session = AnalysisSession::<JawMotionProblem>::new();
//! session.set_input(input)?;
//!
//! step_calibrate(&mut session, None)?;
//! step_register(&mut session, None)?;
//! # Ok(())
//! # }
//! ```

pub mod analysis_session;
pub mod problem_type;
pub mod types;

pub use analysis_session::AnalysisSession;
pub use problem_type::{InvalidationPolicy, ProblemType};
pub use types::{ExportRecord, LogEntry, SessionMetadata, current_timestamp};
