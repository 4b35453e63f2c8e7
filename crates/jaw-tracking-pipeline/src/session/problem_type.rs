//! Problem type trait for analysis sessions.

use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// What to clear from a session when its input or config changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationPolicy {
    pub clear_state: bool,
    pub clear_output: bool,
}

impl InvalidationPolicy {
    pub const KEEP_ALL: Self = Self {
        clear_state: false,
        clear_output: false,
    };

    /// Clear state and output; the export history is kept.
    pub const CLEAR_COMPUTED: Self = Self {
        clear_state: true,
        clear_output: true,
    };
}

impl Default for InvalidationPolicy {
    fn default() -> Self {
        Self::KEEP_ALL
    }
}

/// Interface an analysis problem implements to live in an
/// [`AnalysisSession`](super::AnalysisSession).
///
/// Processing itself lives in step functions taking
/// `&mut AnalysisSession<Self>`, so each step can take its own options and
/// pipelines can be composed freely.
pub trait ProblemType: Sized + 'static {
    /// Parameters; `Default` provides the documented defaults.
    type Config: Clone + Default + Serialize + DeserializeOwned + Debug;
    /// Recorded streams and reference data.
    type Input: Clone + Serialize + DeserializeOwned + Debug;
    /// Intermediate results of the individual steps.
    type State: Clone + Default + Serialize + DeserializeOwned + Debug;
    /// Final result.
    type Output: Clone + Serialize + DeserializeOwned + Debug;
    /// Form handed to downstream consumers.
    type Export: Clone + Serialize + DeserializeOwned + Debug;

    /// Stable snake_case identifier stored in session files.
    fn name() -> &'static str;

    /// Bumped when serialized session contents change incompatibly.
    fn schema_version() -> u32 {
        1
    }

    fn validate_input(_input: &Self::Input) -> Result<()> {
        Ok(())
    }

    fn validate_config(_config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Cross-check input against config.
    fn validate_input_config(_input: &Self::Input, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn on_config_change() -> InvalidationPolicy {
        InvalidationPolicy::KEEP_ALL
    }

    fn export(output: &Self::Output, config: &Self::Config) -> Result<Self::Export>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_constants() {
        assert!(!InvalidationPolicy::KEEP_ALL.clear_state);
        assert!(InvalidationPolicy::CLEAR_COMPUTED.clear_output);
        assert!(InvalidationPolicy::CLEAR_COMPUTED.clear_state);
        assert_eq!(InvalidationPolicy::default(), InvalidationPolicy::KEEP_ALL);
    }
}
