use crate::{StrategyKind, error::StrategyError, signal::Signal, state::StrategyState};
use indexmap::IndexMap;
use quantor_book::snapshot::MarketSnapshot;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::fmt::Debug;

/// Output of one strategy evaluation: zero or more [`Signal`]s plus the next persistent state.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub signals: Vec<Signal>,
    pub state: StrategyState,
}

impl TickOutput {
    /// Evaluation producing no signals, carrying `state` forward unchanged.
    pub fn hold(state: StrategyState) -> Self {
        Self {
            signals: Vec::new(),
            state,
        }
    }
}

/// A trading strategy evaluated against market snapshots on a cadence set by the bot supervisor.
///
/// `on_tick` must be pure with respect to the supplied state: any persistent memory lives in the
/// returned [`TickOutput::state`]. Implementations are CPU-bounded on a single snapshot and never
/// suspend.
pub trait Strategy: Send + Debug {
    fn kind(&self) -> StrategyKind;

    /// Declared parameter schema and current values.
    fn params(&self) -> IndexMap<SmolStr, Decimal>;

    /// Fresh state for a newly started bot.
    fn initial_state(&self) -> StrategyState;

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError>;
}

/// Price a strategy evaluates against: the last trade print, falling back to the mid-price.
pub fn reference_price(snapshot: &MarketSnapshot) -> Option<Decimal> {
    snapshot.last.or_else(|| snapshot.mid_price())
}
