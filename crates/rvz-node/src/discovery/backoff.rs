//! Exponential backoff for directory retries

use std::time::Duration;

use rvz_core::config::BackoffConfig;

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Fraction of the delay added at random (0.0 to 1.0)
    jitter: f64,
    failures: u32,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier,
            jitter,
            failures: 0,
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);

        let next = self.current.as_secs_f64() * self.multiplier;
        self.current = clamped_secs(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay.saturating_add(clamped_secs(jitter_amount, self.max))
    }

    /// Consecutive delays handed out since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Return to the initial delay after a success
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}

/// `secs` as a Duration no larger than `max`; NaN counts as `max`
fn clamped_secs(secs: f64, max: Duration) -> Duration {
    if secs.is_nan() {
        return max;
    }
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs.min(max.as_secs_f64())).unwrap_or(max)
}
