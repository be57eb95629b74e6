use crate::StrategyKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Strategy evaluation and construction errors.
///
/// The bot supervisor maps any of these to the bot's `Erroring` state and suppresses further
/// signals until an operator resumes the bot. Strategies never observe infrastructure errors.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum StrategyError {
    #[error("strategy state mismatch: expected {expected}, got {actual}")]
    StateMismatch {
        expected: StrategyKind,
        actual: StrategyKind,
    },

    #[error("missing strategy parameter: {name}")]
    MissingParam { name: SmolStr },

    #[error("invalid strategy parameter {name} = {value}")]
    InvalidParam { name: SmolStr, value: Decimal },

    #[error("strategy evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("strategy panicked: {message}")]
    Panicked { message: String },
}
