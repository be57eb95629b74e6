use crate::{AccountId, VenueId};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use tracing::trace;

/// Token bucket guarding one venue rate budget.
///
/// Tokens refill continuously at `refill_per_second` up to `capacity`. Acquisition is
/// non-blocking: a caller that finds the bucket empty backs off rather than queueing.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_second: f64, now: DateTime<Utc>) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_second,
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Attempt to take one token at `now`. Returns `false` when the budget is exhausted.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            trace!(tokens = self.tokens, "rate budget exhausted");
            false
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }
}

/// Per-`(venue, account)` rate budgets respected by the orchestrator when routing orders.
#[derive(Debug, Default)]
pub struct RateBudgets {
    buckets: FnvHashMap<(VenueId, AccountId), TokenBucket>,
}

impl RateBudgets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a budget for a `(venue, account)` pair.
    pub fn insert(
        &mut self,
        venue: VenueId,
        account: AccountId,
        capacity: u32,
        refill_per_second: f64,
        now: DateTime<Utc>,
    ) {
        self.buckets.insert(
            (venue, account),
            TokenBucket::new(capacity, refill_per_second, now),
        );
    }

    /// Attempt to take one token for the pair. Pairs with no installed budget are unlimited.
    pub fn try_acquire(&mut self, venue: &VenueId, account: &AccountId, now: DateTime<Utc>) -> bool {
        match self.buckets.get_mut(&(venue.clone(), account.clone())) {
            Some(bucket) => bucket.try_acquire(now),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn time(millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + TimeDelta::milliseconds(millis)
    }

    #[test]
    fn test_bucket_exhausts_and_refills() {
        let mut bucket = TokenBucket::new(2, 1.0, time(0));

        assert!(bucket.try_acquire(time(0)));
        assert!(bucket.try_acquire(time(0)));
        assert!(!bucket.try_acquire(time(0)));

        // One token refilled after one second.
        assert!(bucket.try_acquire(time(1000)));
        assert!(!bucket.try_acquire(time(1000)));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let mut bucket = TokenBucket::new(2, 10.0, time(0));

        assert!(bucket.try_acquire(time(0)));
        // A long idle period must not accumulate more than `capacity` tokens.
        assert!(bucket.try_acquire(time(60_000)));
        assert!(bucket.try_acquire(time(60_000)));
        assert!(!bucket.try_acquire(time(60_000)));
    }

    #[test]
    fn test_unconfigured_pair_is_unlimited() {
        let mut budgets = RateBudgets::new();
        let venue = VenueId::new("paper");
        let account = AccountId::new("main");

        for _ in 0..100 {
            assert!(budgets.try_acquire(&venue, &account, time(0)));
        }
    }
}
