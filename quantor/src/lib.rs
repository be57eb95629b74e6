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

//! # Quantor
//! Core of a multi-strategy autonomous trading platform: the concurrent bot
//! [`Orchestrator`](orchestrator::Orchestrator) together with its subordinate engines - per-bot
//! [`BotSupervisor`](supervisor::BotSupervisor)s driving strategy evaluation, the per-symbol
//! matching books, the serialised [`RiskGuard`](quantor_risk::guard::RiskGuard), the
//! [`MetricsBus`](metrics::MetricsBus) fan-out and the [`AlertEngine`](alert::AlertEngine).
//!
//! ## Overview
//! Market ticks update the per-symbol books and wake subscribed supervisors. Each supervisor
//! drives its strategy on its own cadence; signals flow to the orchestrator, which validates
//! them with the risk guard, routes approved orders to the owning
//! [`ExchangeAdapter`](quantor_execution::adapter::ExchangeAdapter), records fills in the
//! [`TradeJournal`](store::TradeJournal) before the portfolio mutates, and publishes telemetry
//! to the metrics bus. The alert engine taps the bus, evaluates thresholds and dispatches over
//! its channels.
//!
//! Everything hot-path is tasks + typed channels: supervisors, books and the bus are
//! independent tasks, the risk guard is serialised inside the orchestrator, and shutdown
//! propagates top-down with a bounded grace period per level.

/// Bot configuration and lifecycle state machine.
pub mod bot;

/// System-wide configuration.
pub mod config;

/// Metric event model: stamped envelopes, producers, filters.
pub mod event;

/// Non-blocking fan-out of metric events to bounded per-subscriber rings.
pub mod metrics;

/// Alert rules, deduplication and multi-channel dispatch with retry backoff.
pub mod alert;

/// Per-bot supervisor: strategy state ownership, cadence, staleness, shutdown.
pub mod supervisor;

/// The orchestrator: registry ownership, risk gating, order routing, fill accounting.
pub mod orchestrator;

/// Builder wiring a full paper-trading system.
pub mod system;

/// `StateStore` / `TradeJournal` interfaces and in-memory reference implementations.
pub mod store;

/// In-process paper venue backed by the matching books.
pub mod paper;

/// Provides default Quantor tracing logging initialisers.
pub mod logging;

/// Defines all possible errors in Quantor core.
pub mod error;

/// Traits and types related to component shutdowns.
pub mod shutdown;
