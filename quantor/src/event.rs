use crate::bot::BotState;
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use quantor_execution::{Sequence, order::id::BotId, trade::Fill};
use quantor_instrument::symbol::SymbolId;
use quantor_risk::breach::RiskBreach;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Telemetry published by producers (books, supervisors, the risk guard) onto the
/// [`MetricsBus`](crate::metrics::MetricsBus).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum MetricEvent {
    Tick {
        symbol: SymbolId,
        price: Decimal,
        quantity: Decimal,
    },
    Fill {
        bot: BotId,
        fill: Fill,
    },
    PositionUpdate {
        bot: BotId,
        symbol: SymbolId,
        quantity: Decimal,
        equity: Decimal,
    },
    RiskBreach(RiskBreach),
    BotStateChange {
        bot: BotId,
        from: BotState,
        to: BotState,
    },
    SystemHealth {
        component: SmolStr,
        healthy: bool,
        detail: String,
    },
}

/// Discriminant of a [`MetricEvent`], used in publisher-side filters.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum MetricKind {
    Tick,
    Fill,
    PositionUpdate,
    RiskBreach,
    BotStateChange,
    SystemHealth,
}

impl MetricEvent {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Tick { .. } => MetricKind::Tick,
            Self::Fill { .. } => MetricKind::Fill,
            Self::PositionUpdate { .. } => MetricKind::PositionUpdate,
            Self::RiskBreach(_) => MetricKind::RiskBreach,
            Self::BotStateChange { .. } => MetricKind::BotStateChange,
            Self::SystemHealth { .. } => MetricKind::SystemHealth,
        }
    }

    /// The bot the event concerns, if any.
    pub fn bot(&self) -> Option<&BotId> {
        match self {
            Self::Fill { bot, .. }
            | Self::PositionUpdate { bot, .. }
            | Self::BotStateChange { bot, .. } => Some(bot),
            Self::RiskBreach(breach) => Some(&breach.bot),
            Self::Tick { .. } | Self::SystemHealth { .. } => None,
        }
    }
}

/// Identifies one event producer. Sequence numbers are monotonic per producer, never globally.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct ProducerId(pub SmolStr);

impl ProducerId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }
}

/// A [`MetricEvent`] stamped with its producer, per-producer sequence number and wall-clock
/// timestamp. Subscribers detect gaps from the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StampedEvent {
    pub producer: ProducerId,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub event: MetricEvent,
}

/// Stamps outgoing events with a strictly increasing per-producer sequence.
#[derive(Debug)]
pub struct EventStamper {
    producer: ProducerId,
    sequence: Sequence,
}

impl EventStamper {
    pub fn new(producer: ProducerId) -> Self {
        Self {
            producer,
            sequence: Sequence(0),
        }
    }

    pub fn stamp(&mut self, event: MetricEvent, time: DateTime<Utc>) -> StampedEvent {
        StampedEvent {
            producer: self.producer.clone(),
            sequence: self.sequence.fetch_add().value(),
            time,
            event,
        }
    }
}

/// Publisher-side subscription filter, evaluated before fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum MetricFilter {
    #[default]
    All,
    Kinds(Vec<MetricKind>),
    Producer(ProducerId),
    Bot(BotId),
}

impl MetricFilter {
    pub fn matches(&self, event: &StampedEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.event.kind()),
            Self::Producer(producer) => event.producer == *producer,
            Self::Bot(bot) => event.event.bot() == Some(bot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn stamped(producer: &str, sequence: u64, event: MetricEvent) -> StampedEvent {
        StampedEvent {
            producer: ProducerId::new(producer),
            sequence,
            time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            event,
        }
    }

    #[test]
    fn test_stamper_sequences_are_strictly_increasing() {
        let mut stamper = EventStamper::new(ProducerId::new("book-0"));
        let time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let sequences = (0..4)
            .map(|_| {
                stamper
                    .stamp(
                        MetricEvent::Tick {
                            symbol: SymbolId(0),
                            price: dec!(1),
                            quantity: dec!(1),
                        },
                        time,
                    )
                    .sequence
            })
            .collect::<Vec<_>>();

        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_filters() {
        let tick = stamped(
            "book-0",
            0,
            MetricEvent::Tick {
                symbol: SymbolId(0),
                price: dec!(1),
                quantity: dec!(1),
            },
        );
        let state_change = stamped(
            "orchestrator",
            0,
            MetricEvent::BotStateChange {
                bot: BotId::new("b1"),
                from: BotState::Idle,
                to: BotState::Running,
            },
        );

        assert!(MetricFilter::All.matches(&tick));
        assert!(MetricFilter::Kinds(vec![MetricKind::Tick]).matches(&tick));
        assert!(!MetricFilter::Kinds(vec![MetricKind::Fill]).matches(&tick));
        assert!(MetricFilter::Producer(ProducerId::new("book-0")).matches(&tick));
        assert!(!MetricFilter::Producer(ProducerId::new("book-1")).matches(&tick));
        assert!(MetricFilter::Bot(BotId::new("b1")).matches(&state_change));
        assert!(!MetricFilter::Bot(BotId::new("b2")).matches(&state_change));
        assert!(!MetricFilter::Bot(BotId::new("b1")).matches(&tick));
    }
}
