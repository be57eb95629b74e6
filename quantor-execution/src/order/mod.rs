use crate::{error::ExecutionError, order::id::{BotId, OrderId}};
use chrono::{DateTime, Utc};
use derive_more::Display;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `Order` related identifiers.
pub mod id;

/// A concrete trading instruction, born `New` and persisted on every state transition until it
/// reaches a terminal state.
///
/// Invariants:
/// * `0 <= remaining <= quantity`
/// * `state == PartiallyFilled` implies `0 < remaining < quantity`
/// * `Filled`, `Cancelled` and `Rejected` are terminal; `remaining` is frozen and no further
///   fills are applied.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub bot: BotId,
    pub symbol: SymbolId,
    pub side: Side,
    pub kind: OrderKind,
    /// Limit price for `Limit`-like orders, trigger price for `Stop` orders. `None` for `Market`.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub state: OrderState,
    pub submitted_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    ImmediateOrCancel,
    FillOrKill,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Whether the state is terminal - no further transitions or fills are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

impl Order {
    pub fn new(
        id: OrderId,
        bot: BotId,
        symbol: SymbolId,
        side: Side,
        kind: OrderKind,
        price: Option<Decimal>,
        quantity: Decimal,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bot,
            symbol,
            side,
            kind,
            price,
            quantity,
            remaining: quantity,
            state: OrderState::New,
            submitted_at,
            last_event_at: submitted_at,
        }
    }

    /// Quantity filled so far.
    pub fn filled(&self) -> Decimal {
        self.quantity - self.remaining
    }

    /// Apply a fill of `quantity`, transitioning to `PartiallyFilled` or `Filled`.
    ///
    /// Fails with [`ExecutionError::OrderTerminal`] if the order is already terminal, and with
    /// [`ExecutionError::OverFill`] if the fill exceeds `remaining` - a terminal order is never
    /// filled further (order conservation).
    pub fn apply_fill(
        &mut self,
        quantity: Decimal,
        time: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        if self.state.is_terminal() {
            return Err(ExecutionError::OrderTerminal {
                id: self.id,
                state: self.state,
            });
        }
        if quantity <= Decimal::ZERO || quantity > self.remaining {
            return Err(ExecutionError::OverFill {
                id: self.id,
                remaining: self.remaining,
                fill: quantity,
            });
        }

        self.remaining -= quantity;
        self.state = if self.remaining.is_zero() {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        self.last_event_at = time;
        Ok(())
    }

    /// Cancel the unfilled remainder, transitioning to `Cancelled`.
    pub fn cancel(&mut self, time: DateTime<Utc>) -> Result<(), ExecutionError> {
        if self.state.is_terminal() {
            return Err(ExecutionError::OrderTerminal {
                id: self.id,
                state: self.state,
            });
        }
        self.state = OrderState::Cancelled;
        self.last_event_at = time;
        Ok(())
    }

    /// Reject the order, transitioning to `Rejected`. Only valid from `New`.
    pub fn reject(&mut self, time: DateTime<Utc>) -> Result<(), ExecutionError> {
        if self.state != OrderState::New {
            return Err(ExecutionError::OrderTerminal {
                id: self.id,
                state: self.state,
            });
        }
        self.state = OrderState::Rejected;
        self.last_event_at = time;
        Ok(())
    }
}
