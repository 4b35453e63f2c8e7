//! Static transform chains applied to relative-motion trajectories.
//!
//! For jaw tracking the chain is
//! `model_max_se3_model_mand(t) = model_max_se3_HP · HP_se3_MP(t) · MP_se3_model_mand`,
//! i.e. a fixed left transform, the per-sample relative pose, and a fixed
//! right transform.

use jaw_tracking_core::{ConfigurationError, Iso3, Pose};
use serde::{Deserialize, Serialize};

/// Applies `left · pose · right` to every sample, then optionally re-origins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransformer {
    left: Iso3,
    right: Iso3,
    anchor: Option<usize>,
}

impl Default for CoordinateTransformer {
    fn default() -> Self {
        Self {
            left: Iso3::identity(),
            right: Iso3::identity(),
            anchor: None,
        }
    }
}

impl CoordinateTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose `t` onto the left side of the chain (applied last).
    pub fn then_left(mut self, t: Iso3) -> Self {
        self.left = t * self.left;
        self
    }

    /// Compose `t` onto the right side of the chain (applied first).
    pub fn then_right(mut self, t: Iso3) -> Self {
        self.right *= t;
        self
    }

    /// Express every output pose relative to the pose at `anchor`.
    pub fn with_anchor(mut self, anchor: Option<usize>) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn left(&self) -> &Iso3 {
        &self.left
    }

    pub fn right(&self) -> &Iso3 {
        &self.right
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    /// Transform a single pose (no re-origin).
    pub fn transform(&self, pose: &Pose) -> Pose {
        Pose::from_iso(pose.timestamp, &(self.left * pose.to_iso() * self.right))
    }

    /// Transform all poses and apply the anchor re-origin if configured.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError`] if the anchor index is outside the trajectory.
    pub fn apply(&self, poses: &[Pose]) -> Result<Vec<Pose>, ConfigurationError> {
        let transformed: Vec<Pose> = poses.iter().map(|p| self.transform(p)).collect();
        let Some(anchor) = self.anchor else {
            return Ok(transformed);
        };
        let origin = transformed
            .get(anchor)
            .ok_or_else(|| {
                ConfigurationError::new(
                    "transform.anchor_index",
                    format!("index {} outside trajectory of {} samples", anchor, poses.len()),
                )
            })?
            .to_iso()
            .inverse();
        Ok(transformed
            .iter()
            .map(|p| Pose::from_iso(p.timestamp, &(origin * p.to_iso())))
            .collect())
    }
}
