use crate::event::StampedEvent;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use quantor_execution::backoff::Backoff;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum Severity {
    Info,
    Warn,
    High,
    Critical,
}

/// Alert lifecycle: `Open → Acked → Resolved`. Only operators ack or resolve; expired alerts
/// auto-resolve.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum AlertState {
    Open,
    Acked,
    Resolved,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[display("AlertId({_0})")]
pub struct AlertId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub rule: SmolStr,
    pub severity: Severity,
    pub payload: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of merged occurrences since `first_seen`.
    pub count: u64,
    pub state: AlertState,
    pub dedupe_key: SmolStr,
}

/// Predicate over the sliding event window. Returns the alert payload on match.
pub type RulePredicate = Arc<dyn Fn(&[StampedEvent]) -> Option<String> + Send + Sync>;

/// One alert rule.
#[derive(Clone)]
pub struct AlertRule {
    pub id: SmolStr,
    pub predicate: RulePredicate,
    /// Sliding window of events the predicate observes.
    pub window: Duration,
    /// Alerts sharing `dedupe_key` within `cooldown` merge instead of re-dispatching.
    pub cooldown: Duration,
    pub severity: Severity,
    pub channels: Vec<SmolStr>,
    pub dedupe_key: SmolStr,
}

impl fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("window", &self.window)
            .field("cooldown", &self.cooldown)
            .field("severity", &self.severity)
            .field("channels", &self.channels)
            .field("dedupe_key", &self.dedupe_key)
            .finish()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(AlertId),

    #[error("alert {id} cannot transition {from} -> {to}")]
    InvalidTransition {
        id: AlertId,
        from: AlertState,
        to: AlertState,
    },
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("dispatch via {channel} failed: {message}")]
pub struct DispatchError {
    pub channel: SmolStr,
    pub message: String,
}

/// A dispatch capability - email, slack, webhook, sms. Concrete transports are external; the
/// engine only holds the capability.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> SmolStr;

    async fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// One pending channel dispatch produced by rule evaluation.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub alert: Alert,
    pub channel: SmolStr,
}

/// Rule evaluation, deduplication and alert lifecycle.
///
/// The engine is a single-owner state machine: it taps the metrics bus, evaluates each rule's
/// predicate over a sliding window, and produces [`Dispatch`] jobs for the async dispatcher.
#[derive(Debug)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    window: VecDeque<StampedEvent>,
    max_window: Duration,
    alerts: HashMap<AlertId, Alert>,
    /// Most recent alert id per dedupe key.
    by_dedupe: HashMap<SmolStr, AlertId>,
    auto_resolve_after: Duration,
    next_id: u64,
}

impl AlertEngine {
    pub fn new(auto_resolve_after: Duration) -> Self {
        Self {
            rules: Vec::new(),
            window: VecDeque::new(),
            max_window: Duration::ZERO,
            alerts: HashMap::new(),
            by_dedupe: HashMap::new(),
            auto_resolve_after,
            next_id: 0,
        }
    }

    pub fn add_rule(&mut self, rule: AlertRule) {
        self.max_window = self.max_window.max(rule.window);
        self.rules.push(rule);
    }

    pub fn alert(&self, id: AlertId) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    pub fn open_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts
            .values()
            .filter(|alert| alert.state == AlertState::Open)
    }

    /// Feed one event: slide the window, evaluate every rule, merge duplicates within their
    /// cooldown, and return the channel dispatches for newly created alerts.
    pub fn on_event(&mut self, event: StampedEvent, now: DateTime<Utc>) -> Vec<Dispatch> {
        self.window.push_back(event);
        self.prune_window(now);

        let window = self.window.make_contiguous().to_vec();
        let mut dispatches = Vec::new();

        for rule in self.rules.clone() {
            let horizon = now
                - TimeDelta::from_std(rule.window).unwrap_or_else(|_| TimeDelta::seconds(0));
            let visible = window
                .iter()
                .filter(|event| event.time >= horizon)
                .cloned()
                .collect::<Vec<_>>();
            let Some(payload) = (rule.predicate)(&visible) else {
                continue;
            };

            // Merge into a live alert sharing the dedupe key within its cooldown.
            if let Some(id) = self.by_dedupe.get(&rule.dedupe_key).copied()
                && let Some(existing) = self.alerts.get_mut(&id)
                && existing.state != AlertState::Resolved
                && TimeDelta::from_std(rule.cooldown)
                    .map(|cooldown| now - existing.last_seen <= cooldown)
                    .unwrap_or(true)
            {
                existing.last_seen = now;
                existing.count += 1;
                continue;
            }

            let id = AlertId(self.next_id);
            self.next_id += 1;
            let alert = Alert {
                id,
                rule: rule.id.clone(),
                severity: rule.severity,
                payload,
                first_seen: now,
                last_seen: now,
                count: 1,
                state: AlertState::Open,
                dedupe_key: rule.dedupe_key.clone(),
            };
            info!(%id, rule = %rule.id, severity = %rule.severity, "alert opened");
            self.alerts.insert(id, alert.clone());
            self.by_dedupe.insert(rule.dedupe_key.clone(), id);

            dispatches.extend(rule.channels.iter().map(|channel| Dispatch {
                alert: alert.clone(),
                channel: channel.clone(),
            }));
        }

        dispatches
    }

    /// Operator acknowledgement: `Open → Acked`.
    pub fn ack(&mut self, id: AlertId) -> Result<(), AlertError> {
        self.transition(id, AlertState::Acked, &[AlertState::Open])
    }

    /// Operator resolution: `Open | Acked → Resolved`.
    pub fn resolve(&mut self, id: AlertId) -> Result<(), AlertError> {
        self.transition(id, AlertState::Resolved, &[AlertState::Open, AlertState::Acked])
    }

    /// Auto-resolve alerts with no new occurrences for `auto_resolve_after`.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<AlertId> {
        let Ok(expiry) = TimeDelta::from_std(self.auto_resolve_after) else {
            return Vec::new();
        };

        let mut resolved = Vec::new();
        for alert in self.alerts.values_mut() {
            if alert.state != AlertState::Resolved && now - alert.last_seen > expiry {
                alert.state = AlertState::Resolved;
                resolved.push(alert.id);
                info!(id = %alert.id, "alert auto-resolved");
            }
        }
        resolved
    }

    /// Record a meta-alert for a dispatch that exhausted its retries.
    pub fn dispatch_failed(&mut self, failure: &DispatchError, now: DateTime<Utc>) -> AlertId {
        let id = AlertId(self.next_id);
        self.next_id += 1;
        self.alerts.insert(
            id,
            Alert {
                id,
                rule: SmolStr::new_static("meta.dispatch-failed"),
                severity: Severity::High,
                payload: failure.to_string(),
                first_seen: now,
                last_seen: now,
                count: 1,
                state: AlertState::Open,
                dedupe_key: SmolStr::new(format!("dispatch-failed:{}", failure.channel)),
            },
        );
        id
    }

    fn transition(
        &mut self,
        id: AlertId,
        to: AlertState,
        allowed_from: &[AlertState],
    ) -> Result<(), AlertError> {
        let alert = self.alerts.get_mut(&id).ok_or(AlertError::NotFound(id))?;
        if !allowed_from.contains(&alert.state) {
            return Err(AlertError::InvalidTransition {
                id,
                from: alert.state,
                to,
            });
        }
        alert.state = to;
        Ok(())
    }

    fn prune_window(&mut self, now: DateTime<Utc>) {
        let Ok(max_window) = TimeDelta::from_std(self.max_window) else {
            return;
        };
        while let Some(front) = self.window.front() {
            if now - front.time > max_window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Dispatch one alert over one channel with jittered exponential backoff.
///
/// Failures on one channel never affect another: each dispatch runs independently. After the
/// final attempt the error is returned so the caller can raise a meta-alert.
pub async fn dispatch_with_retry(
    channel: Arc<dyn AlertChannel>,
    alert: Alert,
    backoff: Backoff,
) -> Result<(), DispatchError> {
    let mut attempt = 0;
    loop {
        match channel.dispatch(&alert).await {
            Ok(()) => return Ok(()),
            Err(failure) => {
                let Some(delay) = backoff.delay(attempt) else {
                    error!(%failure, attempts = attempt + 1, "alert dispatch exhausted retries");
                    return Err(failure);
                };
                warn!(%failure, attempt, ?delay, "alert dispatch failed - retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Run the alert engine against a metrics subscription until the stream ends.
///
/// Channel dispatches are spawned so a slow transport never delays rule evaluation; exhausted
/// dispatches surface as meta-alerts.
pub async fn run_alert_engine(
    mut engine: AlertEngine,
    channels: HashMap<SmolStr, Arc<dyn AlertChannel>>,
    mut events: crate::metrics::MetricStream,
    backoff: Backoff,
) -> AlertEngine {
    let (meta_tx, mut meta_rx) = mpsc::unbounded_channel::<DispatchError>();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let now = event.time;
                for dispatch in engine.on_event(event, now) {
                    let Some(channel) = channels.get(&dispatch.channel) else {
                        warn!(channel = %dispatch.channel, "no such alert channel configured");
                        continue;
                    };
                    let channel = Arc::clone(channel);
                    let meta_tx = meta_tx.clone();
                    tokio::spawn(async move {
                        if let Err(failure) =
                            dispatch_with_retry(channel, dispatch.alert, backoff).await
                        {
                            let _ = meta_tx.send(failure);
                        }
                    });
                }
                engine.sweep(now);
            }
            Some(failure) = meta_rx.recv() => {
                engine.dispatch_failed(&failure, Utc::now());
            }
        }
    }

    engine
}
