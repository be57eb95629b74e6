use crate::order::{OrderState, id::OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Stable machine-readable reason code carried on every operator-visible rejection.
///
/// eg/ `EXCH_RATE_LIMIT`, `EXCH_INVALID_SYMBOL`
pub type ReasonCode = SmolStr;

/// Errors surfaced by an [`ExchangeAdapter`](crate::adapter::ExchangeAdapter).
///
/// Transient errors are retried by the adapter with jittered backoff; after max attempts they
/// escalate to `Permanent`. Permanent errors are surfaced unchanged.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum AdapterError {
    #[error("transient adapter failure [{code}]: {message}")]
    Transient { code: ReasonCode, message: String },

    #[error("permanent adapter failure [{code}]: {message}")]
    Permanent { code: ReasonCode, message: String },

    #[error("adapter rate budget exhausted [EXCH_RATE_LIMIT]")]
    RateLimited,
}

impl AdapterError {
    pub fn transient<M>(code: &str, message: M) -> Self
    where
        M: Into<String>,
    {
        Self::Transient {
            code: SmolStr::new(code),
            message: message.into(),
        }
    }

    pub fn permanent<M>(code: &str, message: M) -> Self
    where
        M: Into<String>,
    {
        Self::Permanent {
            code: SmolStr::new(code),
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited)
    }

    /// Stable reason code for the error.
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::Transient { code, .. } | Self::Permanent { code, .. } => code.clone(),
            Self::RateLimited => SmolStr::new_static("EXCH_RATE_LIMIT"),
        }
    }
}

/// Errors raised by the local order state machine.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ExecutionError {
    #[error("order {id} is terminal in state {state} and accepts no further transitions")]
    OrderTerminal { id: OrderId, state: OrderState },

    #[error("order {id} with remaining {remaining} cannot absorb fill of {fill}")]
    OverFill {
        id: OrderId,
        remaining: Decimal,
        fill: Decimal,
    },
}
