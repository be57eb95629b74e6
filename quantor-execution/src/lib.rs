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

//! # Quantor-Execution
//! Order and fill data structures, the [`ExchangeAdapter`](adapter::ExchangeAdapter) boundary the
//! platform consumes, and the execution-side utilities built on top of it (idempotency-key
//! de-duplication, per-venue rate budgets, retry backoff).
//!
//! Concrete exchange connectors live outside this workspace; everything here is venue-agnostic.

use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// `Order` model and state machine.
pub mod order;

/// Immutable [`Fill`](trade::Fill) records of order execution.
pub mod trade;

/// The [`ExchangeAdapter`](adapter::ExchangeAdapter) interface, and the tick/fill stream items it
/// produces.
pub mod adapter;

/// Idempotency-key replay cache collapsing duplicate adapter acknowledgements.
pub mod idempotency;

/// Token-bucket rate budget per `(venue, account)`.
pub mod rate_limit;

/// Exponential backoff with jitter for retrying transient failures.
pub mod backoff;

/// Defines all errors surfaced by the execution boundary.
pub mod error;

/// Unique identifier for a trading venue.
///
/// eg/ VenueId("binance_spot")
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct VenueId(pub SmolStr);

impl VenueId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }
}

/// Unique identifier for an account held at a [`VenueId`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct AccountId(pub SmolStr);

impl AccountId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }
}

/// Monotonically increasing event sequence, stamped per producer.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize,
    Display, Constructor,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Return the current value and advance by one.
    pub fn fetch_add(&mut self) -> Sequence {
        let sequence = *self;
        self.0 += 1;
        sequence
    }
}
