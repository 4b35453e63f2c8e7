//! Tool-tip landmark capture from recorded frames (offline calibration).
//!
//! A calibration tool body carries a known tip offset (tip position in the
//! tool frame). While the tip touches an anatomical point, the point's
//! position in the frame of the tracked body `B` is
//!
//! `p_B = (W_se3_B)⁻¹ · W_se3_tool · tip`.
//!
//! The captured landmark is the mean of `p_B` over every usable sample of
//! every configured frame interval.

use jaw_tracking_core::{
    BodyId, FrameRange, LandmarkPoint, LandmarkSetError, Pose, Real, RigidBody, Vec3, mean_vec3,
};
use log::{debug, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relative_motion::DEFAULT_SYNC_EPSILON;

/// Errors raised while capturing landmarks from recorded streams.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("landmark `{landmark}`: interval [{start}, {end}] exceeds stream of {len} samples")]
    IntervalOutOfRange {
        landmark: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("landmark `{landmark}`: no sample with both {body} and {tool} visible in any interval")]
    NoUsableSamples {
        landmark: String,
        body: BodyId,
        tool: BodyId,
    },
    #[error("tool stream {tool} has {tool_len} samples but body stream {body} has {body_len}")]
    LengthMismatch {
        tool: BodyId,
        body: BodyId,
        tool_len: usize,
        body_len: usize,
    },
    #[error(
        "landmark `{landmark}`: {body} and {tool} disagree at sample {index} ({body_ts} vs {tool_ts})"
    )]
    TimestampMismatch {
        landmark: String,
        body: BodyId,
        tool: BodyId,
        index: usize,
        body_ts: Real,
        tool_ts: Real,
    },
    #[error(transparent)]
    Landmark(#[from] LandmarkSetError),
}

/// Named landmark and the frame intervals during which it was touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSpec {
    pub name: String,
    pub intervals: Vec<FrameRange>,
}

impl LandmarkSpec {
    pub fn new(name: impl Into<String>, intervals: Vec<FrameRange>) -> Self {
        Self {
            name: name.into(),
            intervals,
        }
    }
}

/// Calibration tool with its tip offset in the tool frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipProbe {
    pub tool: BodyId,
    pub tip_offset: Vec3,
    /// Largest allowed timestamp difference between paired body and tool
    /// samples.
    #[serde(default = "default_sync_epsilon")]
    pub sync_epsilon: Real,
}

fn default_sync_epsilon() -> Real {
    DEFAULT_SYNC_EPSILON
}

impl TipProbe {
    pub fn new(tool: impl Into<BodyId>, tip_offset: Vec3) -> Self {
        Self {
            tool: tool.into(),
            tip_offset,
            sync_epsilon: DEFAULT_SYNC_EPSILON,
        }
    }

    pub fn with_sync_epsilon(mut self, sync_epsilon: Real) -> Self {
        self.sync_epsilon = sync_epsilon;
        self
    }

    /// Tool tip expressed in the frame of `body`.
    pub fn tip_in_body(&self, body: &Pose, tool: &Pose) -> Vec3 {
        let world = tool.to_iso() * Point3::from(self.tip_offset);
        body.to_iso().inverse_transform_point(&world).coords
    }

    /// Capture one landmark from recorded tool and body streams.
    pub fn capture(
        &self,
        spec: &LandmarkSpec,
        body: &RigidBody,
        tool: &RigidBody,
    ) -> Result<LandmarkPoint, CaptureError> {
        if tool.len() != body.len() {
            return Err(CaptureError::LengthMismatch {
                tool: tool.id.clone(),
                body: body.id.clone(),
                tool_len: tool.len(),
                body_len: body.len(),
            });
        }
        if spec.intervals.is_empty() {
            return Err(LandmarkSetError::NoInterval(spec.name.clone()).into());
        }
        let mut tips = Vec::new();
        let mut skipped = 0usize;
        for range in &spec.intervals {
            if range.is_empty() || range.end >= body.len() {
                return Err(CaptureError::IntervalOutOfRange {
                    landmark: spec.name.clone(),
                    start: range.start,
                    end: range.end,
                    len: body.len(),
                });
            }
            for idx in range.start..=range.end {
                let body_ts = body.samples[idx].timestamp();
                let tool_ts = tool.samples[idx].timestamp();
                if !((body_ts - tool_ts).abs() <= self.sync_epsilon) {
                    return Err(CaptureError::TimestampMismatch {
                        landmark: spec.name.clone(),
                        body: body.id.clone(),
                        tool: tool.id.clone(),
                        index: idx,
                        body_ts,
                        tool_ts,
                    });
                }
                match (body.samples[idx].pose(), tool.samples[idx].pose()) {
                    (Some(b), Some(t)) => tips.push(self.tip_in_body(b, t)),
                    _ => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            warn!(
                "landmark `{}`: skipped {} samples with {} or {} occluded",
                spec.name, skipped, body.id, self.tool
            );
        }
        let position = mean_vec3(&tips).ok_or_else(|| CaptureError::NoUsableSamples {
            landmark: spec.name.clone(),
            body: body.id.clone(),
            tool: self.tool.clone(),
        })?;
        debug!(
            "landmark `{}` in {}: {} samples -> [{:.3}, {:.3}, {:.3}]",
            spec.name,
            body.id,
            tips.len(),
            position.x,
            position.y,
            position.z
        );
        Ok(LandmarkPoint::new(
            spec.name.clone(),
            spec.intervals.clone(),
            position,
        )?)
    }

    /// Capture every landmark in order.
    pub fn capture_all(
        &self,
        specs: &[LandmarkSpec],
        body: &RigidBody,
        tool: &RigidBody,
    ) -> Result<Vec<LandmarkPoint>, CaptureError> {
        specs.iter().map(|s| self.capture(s, body, tool)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaw_tracking_core::synthetic::motion::{head_motion, make_iso, poses_from_isos};
    use jaw_tracking_core::{Iso3, PoseSample};

    /// Tool stream whose tip sits on `point_in_body` for every sample.
    fn touching_tool(body: &[Iso3], point_in_body: Vec3, tip: Vec3) -> Vec<Iso3> {
        body.iter()
            .enumerate()
            .map(|(i, b)| {
                let rot = make_iso((0.3, 0.1 * i as f64 * 0.01, -0.2), (0.0, 0.0, 0.0)).rotation;
                let world_point = b * Point3::from(point_in_body);
                let origin = world_point.coords - rot * tip;
                Iso3::from_parts(origin.into(), rot)
            })
            .collect()
    }

    #[test]
    fn recovers_touched_point() {
        let rate = 100.0;
        let body = head_motion(40, rate);
        let tip = Vec3::new(0.0, 0.0, 85.0);
        let target = Vec3::new(4.0, -30.0, 12.0);
        let tool = touching_tool(&body, target, tip);

        let probe = TipProbe::new("CT", tip);
        let body = RigidBody::from_poses("MP", poses_from_isos(&body, rate));
        let tool = RigidBody::from_poses("CT", poses_from_isos(&tool, rate));
        let spec = LandmarkSpec::new(
            "incisal",
            vec![FrameRange::new(2, 10), FrameRange::new(20, 30)],
        );
        let lm = probe.capture(&spec, &body, &tool).unwrap();
        assert!((lm.captured_position - target).norm() < 1e-9);
        assert_eq!(lm.intervals.len(), 2);
    }

    #[test]
    fn skips_gaps_and_rejects_empty_intervals() {
        let rate = 100.0;
        let body_iso = head_motion(10, rate);
        let tip = Vec3::new(0.0, 0.0, 50.0);
        let tool_iso = touching_tool(&body_iso, Vec3::new(1.0, 2.0, 3.0), tip);
        let probe = TipProbe::new("CT", tip);
        let body = RigidBody::from_poses("MP", poses_from_isos(&body_iso, rate));
        let mut tool = RigidBody::from_poses("CT", poses_from_isos(&tool_iso, rate));
        for i in 0..5 {
            tool.samples[i] = PoseSample::Gap {
                timestamp: i as f64 / rate,
            };
        }

        let ok = probe
            .capture(&LandmarkSpec::new("a", vec![FrameRange::new(3, 7)]), &body, &tool)
            .unwrap();
        assert!((ok.captured_position - Vec3::new(1.0, 2.0, 3.0)).norm() < 1e-9);

        let err = probe
            .capture(&LandmarkSpec::new("b", vec![FrameRange::new(0, 4)]), &body, &tool)
            .unwrap_err();
        assert!(matches!(err, CaptureError::NoUsableSamples { .. }));

        let err = probe
            .capture(&LandmarkSpec::new("c", vec![FrameRange::new(8, 12)]), &body, &tool)
            .unwrap_err();
        assert!(matches!(err, CaptureError::IntervalOutOfRange { len: 10, .. }));
    }

    #[test]
    fn rejects_missing_intervals_and_unpaired_samples() {
        let rate = 100.0;
        let body_iso = head_motion(10, rate);
        let tip = Vec3::new(0.0, 0.0, 50.0);
        let tool_iso = touching_tool(&body_iso, Vec3::new(1.0, 2.0, 3.0), tip);
        let probe = TipProbe::new("CT", tip);
        let body = RigidBody::from_poses("MP", poses_from_isos(&body_iso, rate));
        let mut tool = RigidBody::from_poses("CT", poses_from_isos(&tool_iso, rate));

        let err = probe
            .capture(&LandmarkSpec::new("a", Vec::new()), &body, &tool)
            .unwrap_err();
        assert_eq!(
            err,
            CaptureError::Landmark(LandmarkSetError::NoInterval("a".into()))
        );

        if let PoseSample::Pose(pose) = &mut tool.samples[5] {
            pose.timestamp += 0.002;
        }
        let err = probe
            .capture(&LandmarkSpec::new("b", vec![FrameRange::new(2, 8)]), &body, &tool)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::TimestampMismatch { index: 5, ref body, .. } if body.as_str() == "MP"
        ));
        // Intervals that avoid the shifted sample still capture.
        assert!(
            probe
                .capture(&LandmarkSpec::new("c", vec![FrameRange::new(6, 9)]), &body, &tool)
                .is_ok()
        );
        assert!(
            probe
                .clone()
                .with_sync_epsilon(0.01)
                .capture(&LandmarkSpec::new("d", vec![FrameRange::new(2, 8)]), &body, &tool)
                .is_ok()
        );
    }
}
