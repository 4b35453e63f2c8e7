//! Online landmark calibration state machine.
//!
//! ```text
//! Idle ─arm─▶ Armed ─trigger─▶ Capturing ─window full─▶ Captured
//!               ▲                   │
//!               │ reject            └─require_confirmation─▶ Confirming ─accept─▶ Captured
//!               └──────────────────────────────────────────────┘
//! any active state ─cancel / timeout / lost tracking─▶ Aborted
//! ```
//!
//! Time is taken from sample timestamps, never from the wall clock, so a
//! recorded stream replays deterministically. A captured value becomes
//! visible only in `Captured`; aborting or rejecting discards it.

use std::collections::VecDeque;
use std::fmt;

use jaw_tracking_core::{
    BodyId, ConfigurationError, FrameRange, LandmarkSetError, Real, Vec3, mean_vec3,
};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::CalibrationConfig;
use super::feedback::{FeedbackEvent, FeedbackSink, LogFeedback};
use super::stability::{StabilityDetector, samples_for};
use super::trigger::{CaptureTrigger, TriggerEvent, TriggerStrategy};

/// Slack for comparing elapsed sample time against limits.
const TIME_EPS: Real = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    Idle,
    Armed,
    Capturing,
    Confirming,
    Captured,
    Aborted,
}

impl CalibrationState {
    /// Armed, capturing or confirming.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Armed | Self::Capturing | Self::Confirming)
    }
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Capturing => "capturing",
            Self::Confirming => "confirming",
            Self::Captured => "captured",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("landmark `{landmark}`: timed out while {state} after {elapsed:.3} s (limit {limit} s)")]
    Timeout {
        landmark: String,
        state: CalibrationState,
        elapsed: Real,
        limit: Real,
    },
    #[error("landmark `{landmark}`: tracking lost for {duration:.3} s (grace period {grace} s)")]
    StreamGap {
        landmark: String,
        duration: Real,
        grace: Real,
    },
    #[error("landmark `{landmark}`: calibration cancelled")]
    Cancelled { landmark: String },
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: CalibrationState,
        action: &'static str,
    },
    #[error("pose stream of {body} ended before calibration finished")]
    StreamEnded { body: BodyId },
    #[error(transparent)]
    Landmarks(#[from] LandmarkSetError),
}

/// Operator input delivered alongside the pose stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorCommand {
    Trigger,
    Accept,
    Reject,
    Cancel,
}

/// Tool tip position in the landmark's body frame at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipSample {
    pub frame: usize,
    pub timestamp: Real,
    /// `None` when the tool or the body is occluded.
    pub position: Option<Vec3>,
}

impl TipSample {
    pub fn at(frame: usize, timestamp: Real, position: Vec3) -> Self {
        Self {
            frame,
            timestamp,
            position: Some(position),
        }
    }

    pub fn gap(frame: usize, timestamp: Real) -> Self {
        Self {
            frame,
            timestamp,
            position: None,
        }
    }
}

/// A finalized landmark capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedLandmark {
    pub name: String,
    /// Mean tip position over the capture window.
    pub position: Vec3,
    pub samples: usize,
    pub frames: FrameRange,
    pub start_time: Real,
    pub end_time: Real,
}

/// Drives the capture of one landmark at a time.
pub struct CalibrationStateMachine<T = TriggerStrategy, F = LogFeedback> {
    config: CalibrationConfig,
    detector: StabilityDetector,
    capture_samples: usize,
    trigger: T,
    feedback: F,
    state: CalibrationState,
    landmark: String,
    window: VecDeque<Vec3>,
    capture: Vec<(usize, Real, Vec3)>,
    state_since: Option<Real>,
    last_seen: Option<Real>,
    signal_pending: bool,
    pending: Option<CapturedLandmark>,
    result: Option<CapturedLandmark>,
    error: Option<CalibrationError>,
}

impl CalibrationStateMachine {
    /// Machine with the configured trigger and log feedback.
    pub fn from_config(
        config: &CalibrationConfig,
        sample_rate: Real,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            config,
            sample_rate,
            TriggerStrategy::from_method(config.method, config.guided_order),
            LogFeedback,
        )
    }
}

impl<T: CaptureTrigger, F: FeedbackSink> CalibrationStateMachine<T, F> {
    pub fn new(
        config: &CalibrationConfig,
        sample_rate: Real,
        trigger: T,
        feedback: F,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let detector = StabilityDetector::new(
            config.stability_threshold,
            config.stability_duration,
            sample_rate,
            config.stability_metric,
        )?;
        Ok(Self {
            config: config.clone(),
            detector,
            capture_samples: samples_for(config.capture_window, sample_rate),
            trigger,
            feedback,
            state: CalibrationState::Idle,
            landmark: String::new(),
            window: VecDeque::new(),
            capture: Vec::new(),
            state_since: None,
            last_seen: None,
            signal_pending: false,
            pending: None,
            result: None,
            error: None,
        })
    }

    /// Swap the feedback sink.
    pub fn with_feedback<G: FeedbackSink>(self, feedback: G) -> CalibrationStateMachine<T, G> {
        CalibrationStateMachine {
            config: self.config,
            detector: self.detector,
            capture_samples: self.capture_samples,
            trigger: self.trigger,
            feedback,
            state: self.state,
            landmark: self.landmark,
            window: self.window,
            capture: self.capture,
            state_since: self.state_since,
            last_seen: self.last_seen,
            signal_pending: self.signal_pending,
            pending: self.pending,
            result: self.result,
            error: self.error,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn landmark(&self) -> &str {
        &self.landmark
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    /// Why the machine aborted, if it did.
    pub fn error(&self) -> Option<&CalibrationError> {
        self.error.as_ref()
    }

    /// The captured landmark; only present in `Captured`.
    pub fn captured(&self) -> Option<&CapturedLandmark> {
        self.result.as_ref()
    }

    /// Hand the captured landmark out exactly once.
    pub fn take_captured(&mut self) -> Option<CapturedLandmark> {
        self.result.take()
    }

    /// `Idle → Armed` for `landmark`.
    pub fn arm(&mut self, landmark: impl Into<String>) -> Result<(), CalibrationError> {
        if self.state != CalibrationState::Idle {
            return Err(self.invalid("arm"));
        }
        self.landmark = landmark.into();
        self.enter_armed();
        self.feedback.notify(&FeedbackEvent::Armed {
            landmark: self.landmark.clone(),
        });
        Ok(())
    }

    /// Back to `Idle`, dropping any result or error.
    pub fn reset(&mut self) {
        self.state = CalibrationState::Idle;
        self.clear_buffers();
        self.result = None;
        self.error = None;
        self.last_seen = None;
        self.state_since = None;
    }

    /// Apply an operator command.
    ///
    /// Cancelling an active session returns the resulting
    /// [`CalibrationError::Cancelled`].
    pub fn handle(&mut self, command: OperatorCommand) -> Result<CalibrationState, CalibrationError> {
        match command {
            OperatorCommand::Trigger => {
                if self.state == CalibrationState::Armed {
                    self.signal_pending = true;
                }
            }
            OperatorCommand::Accept => self.accept()?,
            OperatorCommand::Reject => self.reject()?,
            OperatorCommand::Cancel => {
                if self.state.is_active() {
                    let landmark = self.landmark.clone();
                    return Err(self.abort(CalibrationError::Cancelled { landmark }));
                }
            }
        }
        Ok(self.state)
    }

    /// `Confirming → Captured`.
    pub fn accept(&mut self) -> Result<(), CalibrationError> {
        if self.state != CalibrationState::Confirming {
            return Err(self.invalid("accept"));
        }
        if let Some(captured) = self.pending.take() {
            self.finish(captured);
        }
        Ok(())
    }

    /// `Confirming → Armed`; the pending capture is discarded.
    pub fn reject(&mut self) -> Result<(), CalibrationError> {
        if self.state != CalibrationState::Confirming {
            return Err(self.invalid("reject"));
        }
        self.pending = None;
        self.feedback.notify(&FeedbackEvent::Rejected {
            landmark: self.landmark.clone(),
        });
        self.enter_armed();
        Ok(())
    }

    /// Feed one sample. Returns the state after the sample, or the error
    /// that aborted the session on this sample.
    pub fn process(&mut self, sample: &TipSample) -> Result<CalibrationState, CalibrationError> {
        if !self.state.is_active() {
            return Ok(self.state);
        }
        let t = sample.timestamp;
        let since = *self.state_since.get_or_insert(t);

        let limit = match self.state {
            CalibrationState::Armed => self.config.stability_timeout,
            CalibrationState::Capturing => self.config.capture_timeout,
            _ => self.config.confirmation_timeout,
        };
        if t - since > limit + TIME_EPS {
            let err = CalibrationError::Timeout {
                landmark: self.landmark.clone(),
                state: self.state,
                elapsed: t - since,
                limit,
            };
            return Err(self.abort(err));
        }

        match sample.position {
            None => {
                if self.state == CalibrationState::Confirming {
                    return Ok(self.state);
                }
                let lost_since = self.last_seen.unwrap_or(since);
                let duration = t - lost_since;
                if duration > self.config.gap_grace_period + TIME_EPS {
                    let err = CalibrationError::StreamGap {
                        landmark: self.landmark.clone(),
                        duration,
                        grace: self.config.gap_grace_period,
                    };
                    return Err(self.abort(err));
                }
                // A stable window must be contiguous.
                self.window.clear();
            }
            Some(position) => {
                self.last_seen = Some(t);
                match self.state {
                    CalibrationState::Armed => self.on_armed(t, position),
                    CalibrationState::Capturing => self.on_capturing(sample.frame, t, position),
                    _ => {}
                }
            }
        }
        Ok(self.state)
    }

    fn on_armed(&mut self, t: Real, position: Vec3) {
        self.window.push_back(position);
        while self.window.len() > self.detector.required_samples() {
            self.window.pop_front();
        }
        let stable = self.detector.evaluate(self.window.make_contiguous()).stable;
        let event = TriggerEvent {
            signal: std::mem::take(&mut self.signal_pending),
            stable,
        };
        if self.trigger.should_capture(&event) {
            debug!(
                "`{}`: capture triggered at t={:.4} (signal={}, stable={})",
                self.landmark, t, event.signal, event.stable
            );
            self.state = CalibrationState::Capturing;
            self.state_since = Some(t);
            self.capture.clear();
            self.feedback.notify(&FeedbackEvent::CaptureStarted {
                landmark: self.landmark.clone(),
            });
        }
    }

    fn on_capturing(&mut self, frame: usize, t: Real, position: Vec3) {
        self.capture.push((frame, t, position));
        if self.capture.len() < self.capture_samples {
            return;
        }
        let positions: Vec<Vec3> = self.capture.iter().map(|c| c.2).collect();
        let (Some(first), Some(last), Some(mean)) =
            (self.capture.first(), self.capture.last(), mean_vec3(&positions))
        else {
            return;
        };
        let captured = CapturedLandmark {
            name: self.landmark.clone(),
            position: mean,
            samples: positions.len(),
            frames: FrameRange::new(first.0, last.0),
            start_time: first.1,
            end_time: last.1,
        };
        self.capture.clear();
        if self.config.require_confirmation {
            self.feedback.notify(&FeedbackEvent::AwaitingConfirmation {
                landmark: self.landmark.clone(),
                position: captured.position,
            });
            self.pending = Some(captured);
            self.state = CalibrationState::Confirming;
            self.state_since = Some(t);
        } else {
            self.finish(captured);
        }
    }

    fn finish(&mut self, captured: CapturedLandmark) {
        debug!(
            "`{}` captured from {} samples (frames {}..={})",
            captured.name, captured.samples, captured.frames.start, captured.frames.end
        );
        self.feedback.notify(&FeedbackEvent::Captured {
            landmark: captured.name.clone(),
            position: captured.position,
        });
        self.result = Some(captured);
        self.state = CalibrationState::Captured;
    }

    fn enter_armed(&mut self) {
        self.clear_buffers();
        self.trigger.reset();
        self.state = CalibrationState::Armed;
        self.state_since = None;
    }

    fn clear_buffers(&mut self) {
        self.window.clear();
        self.capture.clear();
        self.pending = None;
        self.signal_pending = false;
    }

    fn abort(&mut self, err: CalibrationError) -> CalibrationError {
        self.clear_buffers();
        self.result = None;
        self.state = CalibrationState::Aborted;
        self.feedback.notify(&FeedbackEvent::Aborted {
            landmark: self.landmark.clone(),
            reason: err.to_string(),
        });
        self.error = Some(err.clone());
        err
    }

    fn invalid(&self, action: &'static str) -> CalibrationError {
        CalibrationError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}
