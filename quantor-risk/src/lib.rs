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

//! # Quantor-Risk
//! Portfolio accounting and the risk gate every signal passes before an order leaves the
//! system.
//!
//! The [`RiskGuard`](guard::RiskGuard) owns every bot [`Portfolio`](portfolio::Portfolio)
//! exclusively: all mutation is serialised through the guard, readers receive snapshots. The
//! accounting identity `equity = cash + Σ position.quantity × mark` holds exactly after every
//! applied fill.

use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};

/// Per-`(bot, symbol)` [`Position`](position::Position) with volume-weighted entry price.
pub mod position;

/// Per-bot [`Portfolio`](portfolio::Portfolio): cash, positions, equity, drawdown.
pub mod portfolio;

/// Declared per-bot [`RiskProfile`](profile::RiskProfile) limits.
pub mod profile;

/// The [`RiskGuard`](guard::RiskGuard): pre-trade checks and post-fill accounting.
pub mod guard;

/// Circuit breakers emitting [`RiskBreach`](breach::RiskBreach) events.
pub mod breach;

/// Rolling historical [`ValueAtRisk`](var::ValueAtRisk).
pub mod var;

/// Defines all possible risk errors and refusal codes.
pub mod error;

/// Wrapper tagging an item that passed the risk gate.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
    Constructor,
)]
pub struct RiskApproved<T>(pub T);

impl<T> RiskApproved<T> {
    pub fn into_item(self) -> T {
        self.0
    }
}
