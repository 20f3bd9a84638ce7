//! retry backoff policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff between publish attempts.
///
/// The delay doubles with every retry and is capped at `max_ms`, so the
/// sequence of delays never decreases.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Backoff {
    /// delay before the first retry
    pub initial_ms: u64,
    /// upper bound of a single delay
    pub max_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_ms: 2_000,
            max_ms: 60_000,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1 based). Zero for the first attempt.
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
        let ms = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }
}
