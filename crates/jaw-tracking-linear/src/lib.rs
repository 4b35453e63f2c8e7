//! Closed-form geometry for jaw tracking.
//!
//! - [`registration`]: rigid point-set registration (SVD, reflection-corrected).
//! - [`relative_motion`]: pose of one tracked body in another's frame.
//! - [`coordinate`]: static transform chains and re-origin.
//! - [`landmark_capture`]: tool-tip landmark positions from recorded frames.

pub mod coordinate;
pub mod landmark_capture;
pub mod registration;
pub mod relative_motion;

pub use coordinate::*;
pub use landmark_capture::*;
pub use registration::*;
pub use relative_motion::*;
