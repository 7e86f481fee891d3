//! Exponential backoff between retries of a transfer phase
//!
//! Delays double from `retry.base_delay_ms` and stop growing at
//! `retry.max_delay_ms`. A server-supplied `Retry-After` replaces the
//! computed delay when it is longer, still bounded by the cap.

use std::time::Duration;

use rand::Rng;

use mediapush_core::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl BackoffSchedule {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.jitter)
    }

    /// Ceiling for any single delay
    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Delay before retry number `attempt`, honouring `retry_after`
    ///
    /// With jitter enabled the computed delay is drawn uniformly between the
    /// previous attempt's nominal delay and this one's, so jittered delays
    /// never shrink and sit exactly at the cap once it is reached. A
    /// `Retry-After` value is never shortened.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.nominal(attempt);
        if self.jitter && !delay.is_zero() {
            let floor = match attempt.checked_sub(1) {
                Some(previous) => self.nominal(previous).max(delay / 2),
                None => delay / 2,
            };
            if floor < delay {
                delay = rand::thread_rng().gen_range(floor..=delay);
            }
        }
        match retry_after {
            Some(hint) if hint > delay => hint.min(self.max),
            _ => delay,
        }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
