//! Spatial stability of a window of recent positions.

use jaw_tracking_core::{ConfigurationError, Real, Vec3, ensure_config, mean_vec3};
use serde::{Deserialize, Serialize};

/// Displacement measure used to judge stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityMetric {
    /// Largest distance between any two positions.
    #[default]
    MaxPairwise,
    /// Largest distance from the window centroid.
    MaxToCentroid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityReport {
    pub stable: bool,
    /// Displacement over the evaluated samples.
    pub metric: Real,
}

/// Stateless stability test; the caller owns the rolling buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityDetector {
    threshold: Real,
    duration: Real,
    sample_rate: Real,
    metric: StabilityMetric,
}

impl StabilityDetector {
    pub fn new(
        threshold: Real,
        duration: Real,
        sample_rate: Real,
        metric: StabilityMetric,
    ) -> Result<Self, ConfigurationError> {
        ensure_config!(
            threshold.is_finite() && threshold > 0.0,
            "calibration.stability_threshold",
            "must be positive, got {}",
            threshold
        );
        ensure_config!(
            duration.is_finite() && duration > 0.0,
            "calibration.stability_duration",
            "must be positive, got {}",
            duration
        );
        ensure_config!(
            sample_rate.is_finite() && sample_rate > 0.0,
            "sample_rate",
            "must be positive, got {}",
            sample_rate
        );
        Ok(Self {
            threshold,
            duration,
            sample_rate,
            metric,
        })
    }

    pub fn threshold(&self) -> Real {
        self.threshold
    }

    /// `ceil(duration · sample_rate)`, at least one sample.
    pub fn required_samples(&self) -> usize {
        samples_for(self.duration, self.sample_rate)
    }

    /// Judge the most recent [`required_samples`](Self::required_samples)
    /// positions of `window`. Shorter windows are never stable.
    pub fn evaluate(&self, window: &[Vec3]) -> StabilityReport {
        let required = self.required_samples();
        let recent = &window[window.len().saturating_sub(required)..];
        let metric = match self.metric {
            StabilityMetric::MaxPairwise => max_pairwise(recent),
            StabilityMetric::MaxToCentroid => max_to_centroid(recent),
        };
        StabilityReport {
            stable: window.len() >= required && metric < self.threshold,
            metric,
        }
    }
}

/// Number of samples spanning `seconds` at `rate`, rounded up.
pub(crate) fn samples_for(seconds: Real, rate: Real) -> usize {
    // Tolerate products like 0.5 * 100.0 landing just above an integer.
    ((seconds * rate - 1e-9).ceil() as usize).max(1)
}

fn max_pairwise(points: &[Vec3]) -> Real {
    let mut max: Real = 0.0;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            max = max.max((a - b).norm());
        }
    }
    max
}

fn max_to_centroid(points: &[Vec3]) -> Real {
    let Some(c) = mean_vec3(points) else {
        return 0.0;
    };
    points.iter().map(|p| (p - c).norm()).fold(0.0, Real::max)
}
