//! Calibration parameters.

use jaw_tracking_core::{ConfigurationError, Real, ensure_config};
use serde::{Deserialize, Serialize};

use super::stability::StabilityMetric;

/// Where landmark positions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Averaged over configured frame intervals of a recording.
    #[default]
    Offline,
    /// Detected by the calibration state machine while streaming.
    Online,
}

/// What starts a capture in online mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineMethod {
    /// An operator trigger.
    ButtonTriggered,
    /// The tool tip holding still.
    #[default]
    Automatic,
    /// Both an operator trigger and a still tool tip.
    Guided,
}

/// Ordering required between trigger and stability in guided mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidedOrder {
    /// A trigger arms the capture; it starts once the tip is stable at or
    /// after the trigger.
    #[default]
    SignalThenStability,
    /// Trigger and stability may be observed in any order.
    EitherOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub mode: CalibrationMode,
    pub method: OnlineMethod,
    pub guided_order: GuidedOrder,
    pub stability_metric: StabilityMetric,
    /// Maximum displacement within the stability window (length unit).
    pub stability_threshold: Real,
    /// Seconds the tip has to stay within the threshold.
    pub stability_duration: Real,
    /// Seconds of samples averaged into a landmark.
    pub capture_window: Real,
    pub require_confirmation: bool,
    /// Seconds allowed in `Armed` before giving up.
    pub stability_timeout: Real,
    /// Seconds allowed in `Capturing`.
    pub capture_timeout: Real,
    /// Seconds allowed in `Confirming`.
    pub confirmation_timeout: Real,
    /// Seconds the tracked bodies may be lost before the session aborts.
    pub gap_grace_period: Real,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::Offline,
            method: OnlineMethod::Automatic,
            guided_order: GuidedOrder::SignalThenStability,
            stability_metric: StabilityMetric::MaxPairwise,
            stability_threshold: 0.5,
            stability_duration: 1.0,
            capture_window: 0.5,
            require_confirmation: false,
            stability_timeout: 30.0,
            capture_timeout: 5.0,
            confirmation_timeout: 30.0,
            gap_grace_period: 0.1,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("calibration.stability_threshold", self.stability_threshold),
            ("calibration.stability_duration", self.stability_duration),
            ("calibration.capture_window", self.capture_window),
            ("calibration.stability_timeout", self.stability_timeout),
            ("calibration.capture_timeout", self.capture_timeout),
            ("calibration.confirmation_timeout", self.confirmation_timeout),
        ];
        for (name, value) in positive {
            ensure_config!(
                value.is_finite() && value > 0.0,
                name,
                "must be positive, got {}",
                value
            );
        }
        ensure_config!(
            self.gap_grace_period.is_finite() && self.gap_grace_period >= 0.0,
            "calibration.gap_grace_period",
            "must be non-negative, got {}",
            self.gap_grace_period
        );
        ensure_config!(
            self.capture_timeout >= self.capture_window,
            "calibration.capture_timeout",
            "{} s cannot cover a capture window of {} s",
            self.capture_timeout,
            self.capture_window
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CalibrationConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_nonpositive_threshold() {
        let cfg = CalibrationConfig {
            stability_threshold: 0.0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.parameter, "calibration.stability_threshold");
    }

    #[test]
    fn parses_snake_case_enums() {
        let cfg: CalibrationConfig = serde_json::from_str(
            r#"{"mode": "online", "method": "guided", "guided_order": "either_order"}"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, CalibrationMode::Online);
        assert_eq!(cfg.method, OnlineMethod::Guided);
        assert_eq!(cfg.guided_order, GuidedOrder::EitherOrder);
        assert_eq!(cfg.capture_window, 0.5);
    }
}
