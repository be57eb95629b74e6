use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule with full jitter.
///
/// Delay for attempt `n` (zero-based) is drawn uniformly from `[0, min(cap, base * 2^n)]`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Standard schedule for alert dispatch retries: base 1s, cap 60s, 5 attempts.
    pub fn alert_dispatch() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 5)
    }

    /// Upper bound of the delay for a zero-based `attempt`, before jitter.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(31)));
        exp.min(self.cap)
    }

    /// Jittered delay for a zero-based `attempt`, or `None` once attempts are exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let ceiling = self.ceiling(attempt);
        let jittered = rand::rng().random_range(0..=ceiling.as_millis().max(1) as u64);
        Some(Duration::from_millis(jittered))
    }
}
