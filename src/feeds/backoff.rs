// Reconnect delays with exponential backoff

use rand::Rng;
use std::time::Duration;

use crate::config::FeedConfig;

/// Exponential backoff with a cap and optional proportional jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, backoff_multiplier: f64, jitter: f64) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            backoff_multiplier: backoff_multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.backoff_multiplier,
            config.backoff_jitter,
        )
    }

    /// Delay before reconnect attempt `attempt` (0-based): base * multiplier^attempt, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = attempt.min(64) as i32;
        let mut delay_ms = (base_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);

        if self.jitter > 0.0 && delay_ms > 0.0 {
            let spread = delay_ms * self.jitter;
            delay_ms = (delay_ms + rand::thread_rng().gen_range(-spread..=spread)).clamp(0.0, max_ms);
        }

        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, 0.0)
    }
}
