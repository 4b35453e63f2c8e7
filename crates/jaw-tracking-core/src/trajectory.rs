//! Final trajectory container and derivative naming.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Pose, Real, Vec3};

/// Errors raised when assembling a [`Trajectory`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(Real),
    #[error("timestamps must be strictly increasing (sample {index}: {previous} -> {current})")]
    NonIncreasingTimestamps {
        index: usize,
        previous: Real,
        current: Real,
    },
    #[error("derivative `{kind}` has {got} samples, expected {expected}")]
    MisalignedDerivative {
        kind: DerivativeKind,
        got: usize,
        expected: usize,
    },
    #[error("unknown derivative name `{0}`")]
    UnknownDerivative(String),
}

/// Which channel a derivative is taken of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Translational,
    Rotational,
}

/// A derivative channel: quantity plus differentiation order (`>= 1`).
///
/// The canonical names (`translational_velocity`, `angular_acceleration`, ...)
/// and the short aliases accepted by [`DerivativeKind::from_str`] all refer to
/// the same stored array; naming never triggers a separate computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DerivativeKind {
    pub quantity: Quantity,
    pub order: u32,
}

impl DerivativeKind {
    pub const TRANSLATIONAL_VELOCITY: Self = Self::translational(1);
    pub const TRANSLATIONAL_ACCELERATION: Self = Self::translational(2);
    pub const ANGULAR_VELOCITY: Self = Self::rotational(1);
    pub const ANGULAR_ACCELERATION: Self = Self::rotational(2);

    pub const fn translational(order: u32) -> Self {
        Self {
            quantity: Quantity::Translational,
            order,
        }
    }

    pub const fn rotational(order: u32) -> Self {
        Self {
            quantity: Quantity::Rotational,
            order,
        }
    }

    /// Canonical name of this derivative channel.
    pub fn name(&self) -> String {
        let prefix = match self.quantity {
            Quantity::Translational => "translational",
            Quantity::Rotational => "angular",
        };
        match self.order {
            1 => format!("{prefix}_velocity"),
            2 => format!("{prefix}_acceleration"),
            3 => format!("{prefix}_jerk"),
            k => format!("{prefix}_derivative_{k}"),
        }
    }
}

impl fmt::Display for DerivativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DerivativeKind {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TrajectoryError::UnknownDerivative(s.to_string());
        let (quantity, rest) = if let Some(rest) = s.strip_prefix("translational_") {
            (Quantity::Translational, rest)
        } else if let Some(rest) = s.strip_prefix("linear_") {
            (Quantity::Translational, rest)
        } else if let Some(rest) = s.strip_prefix("angular_") {
            (Quantity::Rotational, rest)
        } else if let Some(rest) = s.strip_prefix("rotational_") {
            (Quantity::Rotational, rest)
        } else {
            (Quantity::Translational, s)
        };
        let order = match rest {
            "velocity" => 1,
            "acceleration" => 2,
            "jerk" => 3,
            other => other
                .strip_prefix("derivative_")
                .and_then(|k| k.parse::<u32>().ok())
                .filter(|k| *k >= 1)
                .ok_or_else(unknown)?,
        };
        Ok(Self { quantity, order })
    }
}

impl From<DerivativeKind> for String {
    fn from(k: DerivativeKind) -> Self {
        k.name()
    }
}

impl TryFrom<String> for DerivativeKind {
    type Error = TrajectoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Registered, time-ordered jaw trajectory with derivative channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    poses: Vec<Pose>,
    sample_rate: Real,
    unit: String,
    derivatives: BTreeMap<DerivativeKind, Vec<Vec3>>,
}

impl Trajectory {
    /// Create a trajectory, checking sample rate and timestamp ordering.
    pub fn new(
        poses: Vec<Pose>,
        sample_rate: Real,
        unit: impl Into<String>,
    ) -> Result<Self, TrajectoryError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(TrajectoryError::InvalidSampleRate(sample_rate));
        }
        for (index, w) in poses.windows(2).enumerate() {
            if !(w[1].timestamp > w[0].timestamp) {
                return Err(TrajectoryError::NonIncreasingTimestamps {
                    index: index + 1,
                    previous: w[0].timestamp,
                    current: w[1].timestamp,
                });
            }
        }
        Ok(Self {
            poses,
            sample_rate,
            unit: unit.into(),
            derivatives: BTreeMap::new(),
        })
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn sample_rate(&self) -> Real {
        self.sample_rate
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Time span between first and last sample in seconds.
    pub fn duration(&self) -> Real {
        match (self.poses.first(), self.poses.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0.0,
        }
    }

    pub fn timestamps(&self) -> Vec<Real> {
        self.poses.iter().map(|p| p.timestamp).collect()
    }

    pub fn translations(&self) -> Vec<Vec3> {
        self.poses.iter().map(|p| p.position).collect()
    }

    /// Attach a derivative channel; it must be aligned 1:1 with the poses.
    pub fn insert_derivative(
        &mut self,
        kind: DerivativeKind,
        values: Vec<Vec3>,
    ) -> Result<(), TrajectoryError> {
        if values.len() != self.poses.len() {
            return Err(TrajectoryError::MisalignedDerivative {
                kind,
                got: values.len(),
                expected: self.poses.len(),
            });
        }
        self.derivatives.insert(kind, values);
        Ok(())
    }

    pub fn derivatives(&self) -> &BTreeMap<DerivativeKind, Vec<Vec3>> {
        &self.derivatives
    }

    pub fn derivative(&self, kind: DerivativeKind) -> Option<&[Vec3]> {
        self.derivatives.get(&kind).map(Vec::as_slice)
    }

    /// Look up a derivative channel by canonical name or alias.
    pub fn derivative_by_name(&self, name: &str) -> Result<Option<&[Vec3]>, TrajectoryError> {
        let kind: DerivativeKind = name.parse()?;
        Ok(self.derivative(kind))
    }

    pub fn clear_derivatives(&mut self) {
        self.derivatives.clear();
    }
}
