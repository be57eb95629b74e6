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

//! # Quantor-Instrument
//! Core `Symbol`, `Side` and registry data structures shared across the Quantor trading platform.
//!
//! Symbols are compared by value. The [`SymbolRegistry`](registry::SymbolRegistry) assigns each
//! registered [`Symbol`](symbol::Symbol) a stable numeric [`SymbolId`](symbol::SymbolId) used on
//! hot paths in place of string comparisons.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// [`Symbol`](symbol::Symbol) and [`SymbolId`](symbol::SymbolId) definitions.
pub mod symbol;

/// Append-only registry assigning stable numeric ids to registered symbols.
pub mod registry;

/// [`Side`] of an order, trade or position - Buy or Sell.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl Side {
    /// Opposite [`Side`] - the side an order crosses against.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}
