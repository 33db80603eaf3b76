//! Run-wide configuration and cooperative cancellation.
//!
//! All tunables are explicit values passed into component constructors.
//! There is no process-wide mutable state: two runs with different
//! configurations can share a thread pool safely.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared configuration for a linkage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkageConfig {
    /// How many pair comparisons between cancellation checks.
    ///
    /// Exhaustive sweeps (cross-product linking, triangle-inequality
    /// validation, ground-truth counting) poll their [`CancelToken`] once per
    /// this many comparisons.
    pub cancel_check_interval: u64,
    /// Maximum plausible birth-year gap between siblings, in years.
    ///
    /// `None` disables the viability check.
    pub max_sibling_age_diff: Option<u32>,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            cancel_check_interval: 10_000,
            max_sibling_age_diff: Some(40),
        }
    }
}

/// Cooperative cancellation handle for long-running sweeps.
///
/// Cheap to clone; all clones observe the same flag. The flag is checked at a
/// bounded granularity (see [`LinkageConfig::cancel_check_interval`]), so
/// cancellation is prompt but not instantaneous.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_default_config() {
        let config = LinkageConfig::default();
        assert!(config.cancel_check_interval > 0);
        assert!(config.max_sibling_age_diff.is_some());
    }
}
