//! Idle backoff: how long a reconciler sleeps after an unproductive cycle.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff, capped, with optional jitter.
///
/// delay = min(base_delay * multiplier^(idle_cycles - 1), max_delay)
///
/// Example with base=100ms, multiplier=2.0, max=5s:
/// - idle cycle 1: 100ms
/// - idle cycle 2: 200ms
/// - idle cycle 3: 400ms
/// - ...
/// - idle cycle 7 onwards: 5s
///
/// With `jitter`, the actual sleep is drawn uniformly from [delay/2, delay]
/// so reconcilers of different shards do not poll in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleBackoff {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl IdleBackoff {
    /// Delay before the next cycle after `idle_cycles` consecutive idle
    /// cycles (1-indexed). Zero idle cycles means no delay.
    pub fn next_delay(&self, idle_cycles: u32) -> Duration {
        if idle_cycles == 0 {
            return Duration::ZERO;
        }
        let exponent = idle_cycles.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// `next_delay` with jitter applied when enabled.
    pub fn sleep_for(&self, idle_cycles: u32) -> Duration {
        let delay = self.next_delay(idle_cycles);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let max_ms = delay.as_millis() as u64;
        let ms = rand::thread_rng().gen_range(max_ms / 2..=max_ms);
        Duration::from_millis(ms)
    }
}
