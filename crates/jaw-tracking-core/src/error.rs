use thiserror::Error;

/// Invalid or missing configuration parameter.
///
/// Raised by configuration validation before any processing starts.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid configuration `{parameter}`: {reason}")]
pub struct ConfigurationError {
    /// Name of the offending parameter (dotted path for nested configs).
    pub parameter: String,
    /// Human readable explanation.
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Return a [`ConfigurationError`] unless `cond` holds.
///
/// ```
/// use jaw_tracking_core::{ConfigurationError, ensure_config};
///
/// fn check(window: usize) -> Result<(), ConfigurationError> {
///     ensure_config!(window % 2 == 1, "window_length", "must be odd, got {}", window);
///     Ok(())
/// }
/// assert!(check(4).is_err());
/// ```
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $param:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::ConfigurationError::new($param, format!($($arg)+)));
        }
    };
}
