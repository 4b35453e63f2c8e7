//! Sub-experiment extraction and ordered combination.

use jaw_tracking_core::{FrameRange, Pose, Real};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::{InterpolationPolicy, Seam, bridge};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(Real),
    #[error("unknown sub-experiment `{0}`")]
    UnknownSubExperiment(String),
    #[error("duplicate sub-experiment `{0}`")]
    DuplicateSubExperiment(String),
    #[error("sub-experiment `{0}` has no frame range")]
    NoRange(String),
    #[error("sub-experiment `{name}`: range [{start}, {end}] outside trajectory of {len} samples")]
    RangeOutOfBounds {
        name: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("no sub-experiment selected")]
    EmptySelection,
    #[error("gap of {len} samples starting at {start} exceeds limit of {max}")]
    GapTooLong { start: usize, len: usize, max: usize },
    #[error("gap [{start}, {end}] touches the end of the stream")]
    UnboundedGap { start: usize, end: usize },
}

/// A named, possibly multi-range slice of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubExperiment {
    pub name: String,
    pub ranges: Vec<FrameRange>,
    /// Bridge used when this sub-experiment is appended to preceding data.
    #[serde(default)]
    pub interpolation: InterpolationPolicy,
}

impl SubExperiment {
    pub fn new(name: impl Into<String>, ranges: Vec<FrameRange>) -> Self {
        Self {
            name: name.into(),
            ranges,
            interpolation: InterpolationPolicy::default(),
        }
    }

    pub fn with_interpolation(mut self, policy: InterpolationPolicy) -> Self {
        self.interpolation = policy;
        self
    }
}

/// Output index range `[start, end]` occupied by one sub-experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSegments {
    pub poses: Vec<Pose>,
    pub spans: Vec<SegmentSpan>,
}

/// Extracts sub-experiments and joins them in caller order.
///
/// Every seam (between ranges of one sub-experiment, or between consecutive
/// sub-experiments) is bridged with the policy of the piece being appended.
/// The combined stream is re-stamped uniformly from its first sample at
/// `sample_rate`.
#[derive(Debug, Clone)]
pub struct SubExperimentSegmenter {
    sample_rate: Real,
    sub_experiments: Vec<SubExperiment>,
}

impl SubExperimentSegmenter {
    pub fn new(sample_rate: Real, sub_experiments: Vec<SubExperiment>) -> Result<Self, SegmentError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SegmentError::InvalidSampleRate(sample_rate));
        }
        let mut seen = HashSet::new();
        for sub in &sub_experiments {
            if !seen.insert(sub.name.as_str()) {
                return Err(SegmentError::DuplicateSubExperiment(sub.name.clone()));
            }
            if sub.ranges.is_empty() {
                return Err(SegmentError::NoRange(sub.name.clone()));
            }
        }
        Ok(Self {
            sample_rate,
            sub_experiments,
        })
    }

    pub fn sub_experiments(&self) -> &[SubExperiment] {
        &self.sub_experiments
    }

    pub fn get(&self, name: &str) -> Option<&SubExperiment> {
        self.sub_experiments.iter().find(|s| s.name == name)
    }

    /// A single sub-experiment with its ranges joined.
    pub fn extract(&self, poses: &[Pose], name: &str) -> Result<Vec<Pose>, SegmentError> {
        Ok(self.combine(poses, &[name])?.poses)
    }

    /// Join the named sub-experiments in the given order.
    pub fn combine<S: AsRef<str>>(
        &self,
        poses: &[Pose],
        order: &[S],
    ) -> Result<CombinedSegments, SegmentError> {
        if order.is_empty() {
            return Err(SegmentError::EmptySelection);
        }
        let mut out: Vec<Pose> = Vec::new();
        let mut spans = Vec::with_capacity(order.len());
        for name in order {
            let name = name.as_ref();
            let sub = self
                .get(name)
                .ok_or_else(|| SegmentError::UnknownSubExperiment(name.to_string()))?;
            let span_start = out.len();
            for range in &sub.ranges {
                if range.is_empty() || range.end >= poses.len() {
                    return Err(SegmentError::RangeOutOfBounds {
                        name: sub.name.clone(),
                        start: range.start,
                        end: range.end,
                        len: poses.len(),
                    });
                }
                let piece = &poses[range.start..=range.end];
                if let Some(last) = out.last() {
                    let before = out.len().checked_sub(2).map(|i| &out[i]);
                    let seam = Seam::new(last, &piece[0]).with_neighbors(before, piece.get(1));
                    let bridged = bridge(&seam, &sub.interpolation);
                    debug!(
                        "seam before `{}` [{}, {}]: {} transition frames ({:?})",
                        sub.name,
                        range.start,
                        range.end,
                        bridged.len(),
                        sub.interpolation.method
                    );
                    out.extend(bridged);
                }
                out.extend_from_slice(piece);
            }
            spans.push(SegmentSpan {
                name: sub.name.clone(),
                start: span_start,
                end: out.len() - 1,
            });
        }
        let t0 = out[0].timestamp;
        for (i, pose) in out.iter_mut().enumerate() {
            pose.timestamp = t0 + i as Real / self.sample_rate;
        }
        Ok(CombinedSegments { poses: out, spans })
    }
}
