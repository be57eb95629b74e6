use crate::{bot::BotState, store::StoreError};
use quantor_execution::{error::AdapterError, order::id::BotId};
use quantor_risk::error::RiskError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Top-level errors surfaced by the orchestrator.
///
/// Every operator-visible rejection carries a stable reason code; strategies never observe any
/// of these directly - infra failures reach them only as rejected signals or bot state
/// transitions.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum QuantorError {
    /// Bad config, unknown symbol, negative price. Surfaced to the caller; never retried.
    #[error("validation failed [{code}]: {message}")]
    Validation { code: SmolStr, message: String },

    /// An inbox is full; the caller retries with backoff or is throttled.
    #[error("backpressure from {component}")]
    Backpressure { component: SmolStr },

    #[error("adapter: {0}")]
    Adapter(#[from] AdapterError),

    /// Accounting mismatch, duplicate fill, journal gap. Fatal: all bots halt, a Critical
    /// alert is dispatched, and an operator restart is required.
    #[error("invariant violation: {0}")]
    Invariant(#[from] RiskError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Operator-initiated deadline elapsed; partial work was rolled back where possible.
    #[error("deadline exceeded during {operation}")]
    Deadline { operation: SmolStr },

    #[error("unknown bot {0}")]
    UnknownBot(BotId),

    #[error("running bot limit {limit} reached")]
    BotLimitReached { limit: usize },

    #[error("bot {bot} cannot transition {from} -> {to}")]
    InvalidTransition {
        bot: BotId,
        from: BotState,
        to: BotState,
    },

    #[error("JoinError: {0}")]
    JoinError(String),
}

impl From<tokio::task::JoinError> for QuantorError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::JoinError(format!("{value:?}"))
    }
}

impl QuantorError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code: SmolStr::new_static(code),
            message: message.into(),
        }
    }

    /// Whether the error is fatal for the whole system rather than one operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
