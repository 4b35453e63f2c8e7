//! Core math and data model for jaw motion tracking.
//!
//! This crate provides the building blocks used by every other crate in the
//! workspace:
//!
//! - linear algebra type aliases (`Real`, `Vec3`, `Iso3`, and friends),
//! - rigid transform helpers (homogeneous 4×4 conversion, exact inversion),
//! - rotation-vector maps (`log_so3`, `exp_so3`) and the SO(3) left Jacobian,
//! - validated pose samples, rigid body identities, and trajectories,
//! - deterministic synthetic data helpers for tests.
//!
//! # Example
//!
//! ```
//! use jaw_tracking_core::{Pose, Vec3};
//! use nalgebra::UnitQuaternion;
//!
//! let pose = Pose::new(0.0, Vec3::new(1.0, 2.0, 3.0), UnitQuaternion::identity());
//! let iso = pose.to_iso();
//! assert_eq!(iso.translation.vector, Vec3::new(1.0, 2.0, 3.0));
//! ```

/// Configuration validation error shared by all configuration structs.
mod error;
/// Captured landmarks, model points, and calibration sets.
mod landmark;
/// Linear algebra type aliases, rotation maps, and rigid transform helpers.
mod math;
/// Validated poses, pose samples with gap markers, and rigid body streams.
mod pose;
/// Final trajectory container and derivative naming.
mod trajectory;

/// Deterministic synthetic data generation helpers.
///
/// Used by workspace tests; stable across platforms because it avoids
/// `thread_rng` and RNG-internal algorithms.
pub mod synthetic;

pub use error::*;
pub use landmark::*;
pub use math::*;
pub use pose::*;
pub use trajectory::*;
