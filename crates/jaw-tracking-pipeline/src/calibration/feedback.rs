//! Operator feedback notifications.
//!
//! Sinks only observe transitions; they cannot influence them.

use jaw_tracking_core::Vec3;
use log::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackEvent {
    Armed { landmark: String },
    CaptureStarted { landmark: String },
    AwaitingConfirmation { landmark: String, position: Vec3 },
    Captured { landmark: String, position: Vec3 },
    Rejected { landmark: String },
    Aborted { landmark: String, reason: String },
}

/// Receives calibration notifications (visual, audio, voice, log...).
pub trait FeedbackSink {
    fn notify(&mut self, event: &FeedbackEvent);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn notify(&mut self, event: &FeedbackEvent) {
        match event {
            FeedbackEvent::Armed { landmark } => {
                info!("place the tool tip on `{landmark}`");
            }
            FeedbackEvent::CaptureStarted { landmark } => {
                info!("capturing `{landmark}`, hold still");
            }
            FeedbackEvent::AwaitingConfirmation { landmark, position } => info!(
                "`{landmark}` at [{:.3}, {:.3}, {:.3}], accept or reject",
                position.x, position.y, position.z
            ),
            FeedbackEvent::Captured { landmark, position } => info!(
                "captured `{landmark}` at [{:.3}, {:.3}, {:.3}]",
                position.x, position.y, position.z
            ),
            FeedbackEvent::Rejected { landmark } => {
                info!("`{landmark}` rejected, re-arming");
            }
            FeedbackEvent::Aborted { landmark, reason } => {
                warn!("calibration of `{landmark}` aborted: {reason}");
            }
        }
    }
}

/// Records notifications, e.g. for a UI queue or tests.
impl FeedbackSink for Vec<FeedbackEvent> {
    fn notify(&mut self, event: &FeedbackEvent) {
        self.push(event.clone());
    }
}

impl<F: FeedbackSink + ?Sized> FeedbackSink for &mut F {
    fn notify(&mut self, event: &FeedbackEvent) {
        (**self).notify(event);
    }
}
