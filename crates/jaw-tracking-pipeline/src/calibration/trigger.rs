//! Capture trigger strategies.

use super::config::{GuidedOrder, OnlineMethod};

/// What the state machine observed on one sample while armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerEvent {
    /// An operator trigger arrived since the previous sample.
    pub signal: bool,
    /// The stability window is full and within threshold.
    pub stable: bool,
}

/// Decides when an armed session starts capturing.
pub trait CaptureTrigger {
    fn should_capture(&mut self, event: &TriggerEvent) -> bool;

    /// Forget latched observations (new landmark or retry).
    fn reset(&mut self) {}
}

/// Captures on an operator trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonTrigger;

impl CaptureTrigger for ButtonTrigger {
    fn should_capture(&mut self, event: &TriggerEvent) -> bool {
        event.signal
    }
}

/// Captures as soon as the tip is stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticTrigger;

impl CaptureTrigger for AutomaticTrigger {
    fn should_capture(&mut self, event: &TriggerEvent) -> bool {
        event.stable
    }
}

/// Requires both an operator trigger and stability.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidedTrigger {
    order: GuidedOrder,
    signal_pending: bool,
    stability_seen: bool,
}

impl GuidedTrigger {
    pub fn new(order: GuidedOrder) -> Self {
        Self {
            order,
            ..Default::default()
        }
    }
}

impl CaptureTrigger for GuidedTrigger {
    fn should_capture(&mut self, event: &TriggerEvent) -> bool {
        self.signal_pending |= event.signal;
        let fire = match self.order {
            GuidedOrder::SignalThenStability => self.signal_pending && event.stable,
            GuidedOrder::EitherOrder => {
                self.stability_seen |= event.stable;
                self.signal_pending && self.stability_seen
            }
        };
        if fire {
            self.reset();
        }
        fire
    }

    fn reset(&mut self) {
        self.signal_pending = false;
        self.stability_seen = false;
    }
}

/// Trigger selected by the configured online method.
#[derive(Debug, Clone, Copy)]
pub enum TriggerStrategy {
    ButtonTriggered(ButtonTrigger),
    Automatic(AutomaticTrigger),
    Guided(GuidedTrigger),
}

impl TriggerStrategy {
    pub fn from_method(method: OnlineMethod, order: GuidedOrder) -> Self {
        match method {
            OnlineMethod::ButtonTriggered => Self::ButtonTriggered(ButtonTrigger),
            OnlineMethod::Automatic => Self::Automatic(AutomaticTrigger),
            OnlineMethod::Guided => Self::Guided(GuidedTrigger::new(order)),
        }
    }
}

impl CaptureTrigger for TriggerStrategy {
    fn should_capture(&mut self, event: &TriggerEvent) -> bool {
        match self {
            Self::ButtonTriggered(t) => t.should_capture(event),
            Self::Automatic(t) => t.should_capture(event),
            Self::Guided(t) => t.should_capture(event),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::ButtonTriggered(t) => t.reset(),
            Self::Automatic(t) => t.reset(),
            Self::Guided(t) => t.reset(),
        }
    }
}
