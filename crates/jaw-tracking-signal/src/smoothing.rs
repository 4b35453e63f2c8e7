//! Savitzky–Golay smoothing of pose trajectories.
//!
//! Each output sample is the value at the center of a least-squares
//! polynomial fitted to the samples in its window. Near either end the
//! window is truncated to the available samples and the polynomial order is
//! lowered, so the output always has the input's length.

use std::collections::HashMap;

use jaw_tracking_core::{Pose, Real, Vec3};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{from_rotation_chart, renormalize, rotation_chart};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SmoothingError {
    #[error("window_length must be odd and at least 1, got {0}")]
    InvalidWindow(usize),
    #[error("poly_order {poly_order} must be smaller than window_length {window_length}")]
    OrderTooHigh {
        poly_order: usize,
        window_length: usize,
    },
    #[error("least-squares fit is singular for window [-{left}, +{right}] at order {order}")]
    Singular {
        left: usize,
        right: usize,
        order: usize,
    },
}

/// Fixed-window polynomial smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSmoother {
    window_length: usize,
    poly_order: usize,
}

impl TemporalSmoother {
    pub fn new(window_length: usize, poly_order: usize) -> Result<Self, SmoothingError> {
        if window_length == 0 || window_length % 2 == 0 {
            return Err(SmoothingError::InvalidWindow(window_length));
        }
        if poly_order >= window_length {
            return Err(SmoothingError::OrderTooHigh {
                poly_order,
                window_length,
            });
        }
        Ok(Self {
            window_length,
            poly_order,
        })
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn poly_order(&self) -> usize {
        self.poly_order
    }

    /// Smooth positions and orientations; timestamps are kept.
    pub fn smooth(&self, poses: &[Pose]) -> Result<Vec<Pose>, SmoothingError> {
        let Some(first) = poses.first() else {
            return Ok(Vec::new());
        };
        let positions: Vec<Vec3> = poses.iter().map(|p| p.position).collect();
        let chart = rotation_chart(&first.orientation, poses.iter().map(|p| p.orientation));
        let positions = self.smooth_vectors(&positions)?;
        let chart = self.smooth_vectors(&chart)?;
        Ok(poses
            .iter()
            .zip(positions.into_iter().zip(chart))
            .map(|(p, (position, phi))| {
                Pose::new(
                    p.timestamp,
                    position,
                    renormalize(from_rotation_chart(&first.orientation, &phi)),
                )
            })
            .collect())
    }

    /// Smooth each component of a vector series.
    pub fn smooth_vectors(&self, series: &[Vec3]) -> Result<Vec<Vec3>, SmoothingError> {
        let Some(origin) = series.first().copied() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(series.len());
        self.for_each_window(series.len(), |lo, coeffs| {
            // Fit deviations from the first sample so constants stay exact.
            let mut acc = Vec3::zeros();
            for (k, c) in coeffs.iter().enumerate() {
                acc += (series[lo + k] - origin) * *c;
            }
            out.push(origin + acc);
        })?;
        Ok(out)
    }

    /// Smooth a scalar series.
    pub fn smooth_series(&self, series: &[Real]) -> Result<Vec<Real>, SmoothingError> {
        let Some(origin) = series.first().copied() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(series.len());
        self.for_each_window(series.len(), |lo, coeffs| {
            let acc: Real = coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| (series[lo + k] - origin) * c)
                .sum();
            out.push(origin + acc);
        })?;
        Ok(out)
    }

    fn for_each_window<F>(&self, n: usize, mut f: F) -> Result<(), SmoothingError>
    where
        F: FnMut(usize, &DVector<Real>),
    {
        let half = self.window_length / 2;
        let mut cache: HashMap<(usize, usize), DVector<Real>> = HashMap::new();
        for i in 0..n {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let key = (i - lo, hi - i);
            if !cache.contains_key(&key) {
                let coeffs = self.coefficients(key.0, key.1)?;
                cache.insert(key, coeffs);
            }
            if let Some(coeffs) = cache.get(&key) {
                f(lo, coeffs);
            }
        }
        Ok(())
    }

    /// Weights evaluating the fitted polynomial at offset 0 over `[-left, +right]`.
    fn coefficients(&self, left: usize, right: usize) -> Result<DVector<Real>, SmoothingError> {
        let m = left + right + 1;
        let order = if m == self.window_length {
            self.poly_order
        } else {
            self.poly_order.min((m - 1) / 2)
        };
        if m == 1 || order == 0 {
            return Ok(DVector::from_element(m, 1.0 / m as Real));
        }
        let scale = left.max(right) as Real;
        let a = DMatrix::from_fn(m, order + 1, |r, c| {
            let x = (r as Real - left as Real) / scale;
            x.powi(c as i32)
        });
        let normal = a.transpose() * &a;
        let chol = normal.cholesky().ok_or(SmoothingError::Singular {
            left,
            right,
            order,
        })?;
        let mut e0 = DVector::zeros(order + 1);
        e0[0] = 1.0;
        Ok(a * chol.solve(&e0))
    }
}
