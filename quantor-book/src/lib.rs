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

//! # Quantor-Book
//! Per-symbol price-time-priority [`OrderBook`](book::OrderBook) with matching, depth queries and
//! a copy-on-publish snapshot feed.
//!
//! The book follows a single-writer / many-readers discipline: one matching routine mutates the
//! book, and after every accepted mutation it assembles an immutable
//! [`MarketSnapshot`](snapshot::MarketSnapshot) and swaps it into a `tokio::sync::watch` channel.
//! Readers borrow the current snapshot without ever blocking the writer; slow subscribers observe
//! coalesced snapshots but never lose the most recent one.

/// Normalised depth [`Level`](level::Level)s for one side of the book.
pub mod level;

/// Immutable [`MarketSnapshot`](snapshot::MarketSnapshot) produced on every observable change.
pub mod snapshot;

/// The matching engine itself.
pub mod book;

/// Explicit rounding for derived quantities.
pub mod rounding;

/// Defines all possible errors produced by the book.
pub mod error;
