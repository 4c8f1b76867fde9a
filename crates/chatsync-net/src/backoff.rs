//! Capped exponential backoff for the reconnect loop.
//!
//! The delay doubles on every failed attempt up to `cap`, optionally spread
//! by a symmetric jitter, and returns to `base` once a connection succeeds.
//! There is no attempt limit: the loop always retries eventually.

use std::time::Duration;

use rand::Rng;

use chatsync_shared::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS, DEFAULT_BACKOFF_JITTER,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub cap: Duration,
    /// Fraction of the delay used as +/- random spread (0.0 disables).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        let nominal = self.config.base.saturating_mul(factor).min(self.config.cap);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }

        let spread = nominal.as_secs_f64() * jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((nominal.as_secs_f64() + offset).max(0.0)).min(self.config.cap)
    }

    /// Call after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
