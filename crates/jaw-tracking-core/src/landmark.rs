//! Anatomical landmarks and calibration sets.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Real, Vec3};

/// Relative singular value below which a point set counts as collinear.
pub const DEGENERACY_TOLERANCE: Real = 1e-9;

/// Geometry problems with a landmark set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandmarkSetError {
    #[error("{set}: need at least 3 landmarks, got {got}")]
    TooFewPoints { set: String, got: usize },
    #[error("{set}: landmarks are collinear or coincident (singular values {singular_values:?})")]
    Degenerate {
        set: String,
        singular_values: [Real; 3],
    },
    #[error("landmark `{0}` has no frame interval")]
    NoInterval(String),
    #[error("landmark `{name}`: invalid frame interval [{start}, {end}]")]
    InvalidInterval {
        name: String,
        start: usize,
        end: usize,
    },
}

/// Inclusive range of sample indices `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of samples covered by the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

/// A captured anatomical landmark.
///
/// `captured_position` is the mean tool-tip position over all samples of all
/// intervals, expressed in the frame of the body the landmark belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub name: String,
    pub intervals: Vec<FrameRange>,
    pub captured_position: Vec3,
}

impl LandmarkPoint {
    pub fn new(
        name: impl Into<String>,
        intervals: Vec<FrameRange>,
        captured_position: Vec3,
    ) -> Result<Self, LandmarkSetError> {
        let name = name.into();
        if intervals.is_empty() {
            return Err(LandmarkSetError::NoInterval(name));
        }
        if let Some(bad) = intervals.iter().find(|r| r.is_empty()) {
            return Err(LandmarkSetError::InvalidInterval {
                name,
                start: bad.start,
                end: bad.end,
            });
        }
        Ok(Self {
            name,
            intervals,
            captured_position,
        })
    }
}

/// A named point with known coordinates in a model/anatomical frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub name: String,
    pub position: Vec3,
}

impl ModelPoint {
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Captured landmarks for both jaws, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    mandibular: Vec<LandmarkPoint>,
    maxillary: Vec<LandmarkPoint>,
}

impl CalibrationSet {
    /// Build a calibration set, failing fast on insufficient or degenerate
    /// geometry in either jaw.
    pub fn new(
        mandibular: Vec<LandmarkPoint>,
        maxillary: Vec<LandmarkPoint>,
    ) -> Result<Self, LandmarkSetError> {
        check_landmark_geometry("mandibular", &positions(&mandibular))?;
        check_landmark_geometry("maxillary", &positions(&maxillary))?;
        Ok(Self {
            mandibular,
            maxillary,
        })
    }

    pub fn mandibular(&self) -> &[LandmarkPoint] {
        &self.mandibular
    }

    pub fn maxillary(&self) -> &[LandmarkPoint] {
        &self.maxillary
    }
}

fn positions(points: &[LandmarkPoint]) -> Vec<Vec3> {
    points.iter().map(|p| p.captured_position).collect()
}

/// Singular values (descending) of the centered point matrix.
pub fn point_spread(points: &[Vec3]) -> [Real; 3] {
    if points.is_empty() {
        return [0.0; 3];
    }
    let n = points.len() as Real;
    let centroid = points.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;
    let centered = DMatrix::from_fn(points.len(), 3, |r, c| points[r][c] - centroid[c]);
    let mut sv: Vec<Real> = centered
        .svd(false, false)
        .singular_values
        .iter()
        .copied()
        .collect();
    sv.sort_by(|a, b| b.total_cmp(a));
    sv.resize(3, 0.0);
    [sv[0], sv[1], sv[2]]
}

/// Check that a point set has at least 3 points and spans a plane.
pub fn check_landmark_geometry(set: &str, points: &[Vec3]) -> Result<(), LandmarkSetError> {
    if points.len() < 3 {
        return Err(LandmarkSetError::TooFewPoints {
            set: set.to_string(),
            got: points.len(),
        });
    }
    let sv = point_spread(points);
    if sv[0] <= Real::EPSILON || sv[1] <= DEGENERACY_TOLERANCE * sv[0] {
        return Err(LandmarkSetError::Degenerate {
            set: set.to_string(),
            singular_values: sv,
        });
    }
    Ok(())
}
