//! Retry / backoff policy
//!
//! Exponential backoff with a cap and jitter. Attempts are unbounded in daemon
//! mode and bounded in one-shot mode.

use rand::Rng;
use std::time::Duration;

use crate::ContractError;

/// Backoff configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Relative jitter, 0.0 - 1.0
    pub jitter: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Default::default()
        }
    }

    /// Limit the total number of attempts (first try included)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let factor = rand::rng().random_range(-self.jitter..=self.jitter);
            capped * (1.0 + factor)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.clamp(0.0, self.max.as_secs_f64()))
    }

    /// Delay after a failure, honouring rate-limit hints
    ///
    /// A 429 waits at least twice the regular delay, or the server's
    /// `Retry-After` when that is longer, still capped at `max`.
    pub fn delay_for_error(&self, attempt: u32, error: &ContractError) -> Duration {
        let delay = self.delay_for(attempt);
        match error {
            ContractError::SourceRateLimited { retry_after } => {
                let doubled = delay.saturating_mul(2);
                retry_after.map_or(doubled, |hint| hint.max(doubled)).min(self.max)
            }
            _ => delay,
        }
    }
}
