#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Quantor-Strategy
//! The [`Strategy`](strategy::Strategy) runtime interface, the [`Signal`](signal::Signal) model,
//! seven strategy implementations, and the Decimal-exact technical indicators they consult.
//!
//! Strategies are pure with respect to the supplied [`StrategyState`](state::StrategyState):
//! `on_tick` never suspends and any persistent memory lives in the returned state. All
//! infrastructure concerns (cadence, staleness, error escalation) belong to the bot supervisor.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The [`Strategy`](strategy::Strategy) interface and tick output types.
pub mod strategy;

/// Per-kind persistent [`StrategyState`](state::StrategyState).
pub mod state;

/// The [`Signal`](signal::Signal) a strategy emits - a trade recommendation, not an order.
pub mod signal;

/// Decimal-exact technical indicators.
///
/// eg/ `Sma`, `Ema`, `Rsi`, `Bollinger`, `Macd`.
pub mod indicators;

/// Registry constructing strategies from declared parameters.
pub mod registry;

/// Defines all possible strategy errors.
pub mod error;

/// Dollar-cost-averaging strategy.
pub mod dca;

/// Grid trading strategy.
pub mod grid;

/// RSI + volume momentum strategy.
pub mod momentum;

/// Bollinger-band mean-reversion strategy.
pub mod mean_reversion;

/// Cross-venue arbitrage strategy.
pub mod arbitrage;

/// Tight-spread scalping strategy.
pub mod scalping;

/// MACD + moving-average swing strategy on 4h bars.
pub mod swing;

/// Supported strategy kinds.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum StrategyKind {
    Dca,
    Grid,
    Momentum,
    MeanReversion,
    Arbitrage,
    Scalping,
    Swing,
}

impl StrategyKind {
    /// Default evaluation cadence for the kind, used by the bot supervisor unless overridden.
    pub fn default_interval(&self) -> Duration {
        match self {
            Self::Dca => Duration::from_secs(3600),
            Self::Grid => Duration::from_secs(5),
            Self::Momentum => Duration::from_secs(5),
            Self::MeanReversion => Duration::from_secs(5),
            Self::Arbitrage => Duration::from_secs(1),
            Self::Scalping => Duration::from_secs(60),
            Self::Swing => Duration::from_secs(300),
        }
    }
}
