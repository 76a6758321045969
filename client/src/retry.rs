//! Reconnection delay policies for the transport session

use rand::Rng;
use std::time::Duration;

/// Decides how long to wait before reconnect attempt `attempt` (1-based) and
/// whether to keep trying at all.
pub trait RetryPolicy: Send + Sync + 'static {
    fn delay(&self, attempt: u32) -> Duration;

    /// `None` retries forever.
    fn max_attempts(&self) -> Option<u32> {
        None
    }

    fn allows(&self, attempt: u32) -> bool {
        self.max_attempts().map_or(true, |max| attempt <= max)
    }
}

/// Same delay before every attempt, never gives up.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl RetryPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay capped at `max_delay`, with optional random jitter of up
/// to half the computed delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.raw_delay(attempt);
        if !self.jitter {
            return delay;
        }

        let spread = delay.as_millis() as u64 / 2;
        if spread == 0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(0..=spread);
        (delay - Duration::from_millis(spread) + Duration::from_millis(offset)).min(self.max_delay)
    }

    fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}
