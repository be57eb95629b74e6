use quantor_instrument::symbol::SymbolId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Stable refusal codes carried on every rejected signal.
pub mod code {
    pub const BOT_PAUSED: &str = "BOT_PAUSED";
    pub const RISK_SIGNAL_EXPIRED: &str = "RISK_SIGNAL_EXPIRED";
    pub const RISK_POSITION_LIMIT: &str = "RISK_POSITION_LIMIT";
    pub const RISK_DAILY_LOSS: &str = "RISK_DAILY_LOSS";
    pub const RISK_DRAWDOWN: &str = "RISK_DRAWDOWN";
    pub const RISK_OVERDRAFT: &str = "RISK_OVERDRAFT";
    pub const RISK_CONCENTRATION: &str = "RISK_CONCENTRATION";
    pub const RISK_MIN_LOT: &str = "RISK_MIN_LOT";
    pub const RISK_NO_MARK: &str = "RISK_NO_MARK";
    pub const RISK_UNKNOWN_BOT: &str = "RISK_UNKNOWN_BOT";
}

/// A signal refused by the risk gate, with the item handed back to the caller.
///
/// `code` is stable and machine-readable; `message` is for humans.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
#[error("risk refused [{code}]: {message}")]
pub struct RiskRefused<T> {
    pub item: T,
    pub code: SmolStr,
    pub message: String,
}

impl<T> RiskRefused<T> {
    pub fn new(item: T, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            item,
            code: SmolStr::new_static(code),
            message: message.into(),
        }
    }

    pub fn into_item(self) -> T {
        self.item
    }
}

/// Fatal accounting errors. Any of these halts all bots and requires an operator restart.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RiskError {
    #[error("fill would overdraft cash: have {cash}, need {required}")]
    Overdraft { cash: Decimal, required: Decimal },

    #[error("accounting mismatch for {symbol}: expected unrealised {expected}, found {actual}")]
    AccountingMismatch {
        symbol: SymbolId,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("no portfolio registered for bot")]
    UnknownBot,
}
