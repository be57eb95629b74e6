use quantor_risk::guard::MarkPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// System-wide configuration. Every option has an explicit effect; defaults are production
/// sensible.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Hard cap on concurrently `Running` bots.
    pub max_concurrent_bots: usize,
    /// Default signal time-to-live; strategies may override per signal.
    #[serde(with = "duration_secs")]
    pub signal_ttl: Duration,
    /// Snapshot age beyond which a supervisor enters `Erroring`.
    #[serde(with = "duration_secs")]
    pub max_staleness: Duration,
    /// Per-level grace period on `Stop`; a supervisor missing it is force-terminated.
    #[serde(with = "duration_secs")]
    pub shutdown_deadline: Duration,
    /// Default bounded ring capacity per metrics subscriber.
    pub metrics_subscriber_capacity: usize,
    /// Alerts sharing a dedupe key within this window merge instead of re-dispatching.
    #[serde(with = "duration_secs")]
    pub alert_cooldown: Duration,
    /// Open alerts with no new events for this long auto-resolve.
    #[serde(with = "duration_secs")]
    pub alert_auto_resolve_after: Duration,
    /// Window within which duplicate adapter acknowledgements collapse.
    #[serde(with = "duration_secs")]
    pub idempotency_replay_window: Duration,
    /// Depth levels included in published book snapshots.
    pub book_depth_levels: usize,
    /// Bounded capacity of the risk guard inbox; overflow rejects with backpressure.
    pub risk_inbox_capacity: usize,
    /// Price used for exposure and unrealised P&L.
    pub mark_policy: MarkPolicy,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_concurrent_bots: 64,
            signal_ttl: Duration::from_secs(5),
            max_staleness: Duration::from_secs(30),
            shutdown_deadline: Duration::from_secs(2),
            metrics_subscriber_capacity: 1024,
            alert_cooldown: Duration::from_secs(60),
            alert_auto_resolve_after: Duration::from_secs(900),
            idempotency_replay_window: Duration::from_secs(600),
            book_depth_levels: 10,
            risk_inbox_capacity: 1024,
            mark_policy: MarkPolicy::LastTrade,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
