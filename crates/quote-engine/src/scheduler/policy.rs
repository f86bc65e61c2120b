use std::time::Duration;

use rand::Rng;

use crate::config::EngineConfig;

/// Jittered exponential backoff between chunk attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_pct: f64,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_pct: f64) -> Self {
        let jitter_pct = if jitter_pct.is_finite() {
            jitter_pct.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_pct,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.max_chunk_attempts,
            config.backoff_base,
            config.backoff_cap,
            config.backoff_jitter,
        )
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped,
    /// then spread by +/- `jitter_pct`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = 2_u32.saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if self.jitter_pct <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_pct;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + delta).max(0.0))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
