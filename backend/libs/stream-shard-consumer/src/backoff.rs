//! Full-jitter exponential backoff.
//!
//! Concurrent consumers hitting the same rate limit would retry in lock step with
//! plain exponential backoff. Full jitter samples the delay uniformly from
//! `[0, min(cap, base * exponent^attempt)]`, which spreads retries across the window.
use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Stateless delay calculator for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct FullJitterBackoff {
    base: Duration,
    max: Duration,
    exponent: f64,
}

impl FullJitterBackoff {
    pub fn new(base: Duration, max: Duration, exponent: f64) -> Self {
        Self {
            base,
            max,
            exponent,
        }
    }

    /// Upper bound of the jitter window for a 0-based attempt index
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64;
        if base_ms == 0.0 {
            return Duration::ZERO;
        }
        let max_ms = self.max.as_millis() as f64;
        // growth overflows to infinity for large attempts and saturates at the cap
        let exp_ms = base_ms * self.exponent.powf(attempt as f64);
        Duration::from_millis(max_ms.min(exp_ms) as u64)
    }

    /// Sample a delay for `attempt` using the thread-local RNG
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling_ms = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rng.gen_range(0..=ceiling_ms))
    }
}

impl From<&BackoffConfig> for FullJitterBackoff {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_millis),
            Duration::from_millis(config.max_millis),
            config.exponent,
        )
    }
}

/// Attempt counter for one failure kind at one call site.
///
/// Discovery, cursor acquisition and fetch each own an instance; counters are
/// never shared. `reset` is called on the first success after a failure streak.
#[derive(Debug, Clone)]
pub struct RetryAttempts {
    policy: FullJitterBackoff,
    max_retries: Option<u32>,
    attempts: u32,
}

impl RetryAttempts {
    pub fn new(policy: FullJitterBackoff, max_retries: Option<u32>) -> Self {
        Self {
            policy,
            max_retries,
            attempts: 0,
        }
    }

    /// Delay before the next retry, or `None` once the configured bound is exceeded.
    ///
    /// Increments the counter.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_retries {
            if self.attempts >= max {
                return None;
            }
        }
        let delay = self.policy.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
