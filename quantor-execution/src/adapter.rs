use crate::{
    AccountId, VenueId,
    error::AdapterError,
    order::{OrderKind, id::{BotId, ClientOrderId, VenueOrderId}},
    trade::Fill,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use futures::stream::BoxStream;
use quantor_instrument::{Side, symbol::{Symbol, SymbolId}};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Single public trade print observed on a venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Tick {
    pub symbol: SymbolId,
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    pub time: DateTime<Utc>,
}

/// Outbound order as submitted to a venue.
///
/// `key` is the client-generated idempotency key: a venue receiving the identical key within its
/// replay window returns the same [`Ack`] instead of opening a second order.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct ClientOrder {
    pub key: ClientOrderId,
    pub bot: BotId,
    pub symbol: SymbolId,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

/// Venue acknowledgement of an accepted submission or cancellation.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Ack {
    pub key: ClientOrderId,
    pub venue_order: VenueOrderId,
}

/// Fill notification from a venue account stream.
///
/// `sequence` is assigned per `key` by the venue, so a partially filled order produces a distinct
/// `(key, sequence)` pair per fill while a replayed notification carries the same pair and can be
/// collapsed by the [`IdempotencyCache`](crate::idempotency::IdempotencyCache).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct FillEvent {
    pub key: ClientOrderId,
    pub sequence: u64,
    pub fill: Fill,
}

/// The exchange boundary the platform consumes.
///
/// Concrete implementations (REST/WebSocket connectors, the in-process paper venue) submit
/// orders, stream public ticks, and report private fills. Transient failures are retried inside
/// the adapter with jittered backoff; permanent failures surface unchanged.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Venue this adapter executes on.
    fn venue(&self) -> VenueId;

    /// Account the adapter trades with.
    fn account(&self) -> AccountId;

    /// Whether the venue lists the provided symbol.
    fn supports(&self, symbol: &Symbol) -> bool;

    /// Minimum base-asset lot size for the symbol.
    fn min_lot(&self, symbol: &SymbolId) -> Decimal;

    /// Price tick size for the symbol.
    fn tick_size(&self, symbol: &SymbolId) -> Decimal;

    /// Submit an order. Identical `order.key` within the venue replay window returns the
    /// original [`Ack`].
    async fn submit(&self, order: ClientOrder) -> Result<Ack, AdapterError>;

    /// Cancel a previously acknowledged order.
    async fn cancel(&self, venue_order: VenueOrderId) -> Result<(), AdapterError>;

    /// Stream of public trade prints for one symbol.
    async fn ticks(&self, symbol: SymbolId) -> Result<BoxStream<'static, Tick>, AdapterError>;

    /// Stream of private fills for the adapter's account.
    async fn fills(&self) -> Result<BoxStream<'static, FillEvent>, AdapterError>;

    /// Cheap health probe used by bot start-up checks.
    async fn is_reachable(&self) -> bool;
}
