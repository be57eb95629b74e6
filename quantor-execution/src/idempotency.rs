use crate::order::id::ClientOrderId;
use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use tracing::debug;

/// Replay cache collapsing duplicate adapter acknowledgements into a single logical result.
///
/// Keys are `(ClientOrderId, venue fill sequence)` pairs; entries older than the configured
/// replay window are pruned on insertion. Within the window, observing a pair a second time is
/// reported as a replay so the caller journals at most one `Fill` per pair.
#[derive(Debug)]
pub struct IdempotencyCache {
    window: TimeDelta,
    seen: FnvHashMap<(ClientOrderId, u64), DateTime<Utc>>,
}

/// Outcome of offering an event to the [`IdempotencyCache`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Offer {
    /// First observation within the replay window - process the event.
    Fresh,
    /// Duplicate of an event already processed - drop it.
    Replay,
}

impl IdempotencyCache {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            seen: FnvHashMap::default(),
        }
    }

    /// Offer a `(key, sequence)` observation at `now`.
    pub fn offer(&mut self, key: ClientOrderId, sequence: u64, now: DateTime<Utc>) -> Offer {
        self.prune(now);

        match self.seen.insert((key.clone(), sequence), now) {
            Some(_) => {
                debug!(%key, sequence, "collapsed duplicate adapter acknowledgement");
                Offer::Replay
            }
            None => Offer::Fresh,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.seen.retain(|_, seen_at| now - *seen_at <= window);
    }
}
