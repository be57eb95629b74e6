use async_trait::async_trait;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use quantor_execution::{order::id::BotId, trade::Fill};
use quantor_risk::{breach::RiskBreach, portfolio::Portfolio};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A value with its store version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum StoreError {
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("journal sequence regressed for bot {bot}: next {next}, appended {appended}")]
    SequenceRegression { bot: BotId, next: u64, appended: u64 },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Durable key-value configuration store with linearizable reads per key.
///
/// Used for bot configs, risk profiles and the resting-order mirror. Keys follow the logical
/// layout `bots/{id}`, `portfolio/{botId}`, `orders/open/{botId}`, `alerts/{id}`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Versioned<serde_json::Value>>, StoreError>;

    /// Compare-and-swap: replaces the value only if the current version matches.
    async fn cas(
        &self,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError>;
}

/// One record in the append-only per-bot trade journal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum JournalRecord {
    Fill(Fill),
    PositionSnapshot(Portfolio),
    RiskBreach(RiskBreach),
}

/// A journal record with its per-bot sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub record: T,
}

/// Append-only per-bot trade log. One writer per bot preserves per-bot ordering; readers are
/// unbounded. Reading yields records in append order with strictly increasing sequences.
#[async_trait]
pub trait TradeJournal: Send + Sync {
    async fn append(&self, bot: &BotId, record: JournalRecord) -> Result<u64, StoreError>;

    async fn read(&self, bot: &BotId) -> Result<Vec<Sequenced<JournalRecord>>, StoreError>;
}

/// Rebuild a bot's portfolio from its journal.
///
/// The metrics bus is not a reliable channel; the journal is. Recovery starts from the most
/// recent `PositionSnapshot` (or a fresh portfolio with `starting_cash`) and replays every
/// later `Fill` in append order. A journal whose sequences are not strictly increasing is an
/// invariant violation.
pub fn replay_portfolio(
    starting_cash: rust_decimal::Decimal,
    records: &[Sequenced<JournalRecord>],
) -> Result<Portfolio, StoreError> {
    for window in records.windows(2) {
        if window[1].sequence <= window[0].sequence {
            return Err(StoreError::Serialization(format!(
                "journal gap: sequence {} follows {}",
                window[1].sequence, window[0].sequence
            )));
        }
    }

    let base = records
        .iter()
        .rposition(|entry| matches!(entry.record, JournalRecord::PositionSnapshot(_)));

    let (mut portfolio, replay_from) = match base {
        Some(index) => {
            let JournalRecord::PositionSnapshot(snapshot) = &records[index].record else {
                unreachable!("rposition matched a PositionSnapshot");
            };
            (snapshot.clone(), index + 1)
        }
        None => (Portfolio::new(starting_cash), 0),
    };

    for entry in &records[replay_from..] {
        if let JournalRecord::Fill(fill) = &entry.record {
            portfolio
                .apply_fill(fill)
                .map_err(|failure| StoreError::Serialization(failure.to_string()))?;
        }
    }

    Ok(portfolio)
}

/// In-memory [`StateStore`] reference implementation used by tests and paper trading.
/// No durability guarantees.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, Versioned<serde_json::Value>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        let version = entries.get(key).map(|v| v.version + 1).unwrap_or(0);
        entries.insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }

    async fn get(&self, key: &str) -> Result<Option<Versioned<serde_json::Value>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn cas(
        &self,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        let current = entries.get(key).map(|v| v.version).unwrap_or(0);
        if current != expected_version {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: current,
            });
        }
        let version = expected_version + 1;
        entries.insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }
}

/// In-memory [`TradeJournal`] reference implementation. No durability guarantees.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    logs: RwLock<FnvHashMap<BotId, Vec<Sequenced<JournalRecord>>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records journaled for one bot.
    pub fn len(&self, bot: &BotId) -> usize {
        self.logs.read().get(bot).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl TradeJournal for InMemoryJournal {
    async fn append(&self, bot: &BotId, record: JournalRecord) -> Result<u64, StoreError> {
        let mut logs = self.logs.write();
        let log = logs.entry(bot.clone()).or_default();
        let sequence = log.len() as u64;
        log.push(Sequenced { sequence, record });
        Ok(sequence)
    }

    async fn read(&self, bot: &BotId) -> Result<Vec<Sequenced<JournalRecord>>, StoreError> {
        Ok(self.logs.read().get(bot).cloned().unwrap_or_default())
    }
}
