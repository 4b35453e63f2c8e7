//! Deterministic synthetic data helpers.
//!
//! Building blocks for constructing synthetic tracking sessions: smooth head
//! and jaw motions, pose streams at a fixed sample rate, and reproducible
//! Gaussian noise.

pub mod motion;
pub mod noise;
