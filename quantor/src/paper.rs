use async_trait::async_trait;
use chrono::Utc;
use fnv::FnvHashMap;
use futures::{StreamExt, stream::BoxStream};
use parking_lot::Mutex;
use quantor_book::{
    book::{BookConfig, CancelOutcome, OrderBook, SubmitOutcome},
    snapshot::MarketSnapshot,
};
use quantor_execution::{
    AccountId, VenueId,
    adapter::{Ack, ClientOrder, ExchangeAdapter, FillEvent, Tick},
    error::AdapterError,
    order::{
        Order,
        id::{ClientOrderId, OrderId, OrderIdGenerator, VenueOrderId},
    },
    trade::Fill,
};
use quantor_instrument::{
    registry::SymbolRegistry,
    symbol::{Symbol, SymbolId},
};
use rust_decimal::Decimal;
use smol_str::format_smolstr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tracing::debug;

/// In-process paper venue backed by one [`OrderBook`] per listed symbol.
///
/// Used for paper trading and by the integration tests; real venues plug in through the same
/// [`ExchangeAdapter`] boundary. Submissions with an already-seen idempotency key return the
/// original [`Ack`] without touching the book.
pub struct PaperExchange {
    venue: VenueId,
    account: AccountId,
    symbols: Vec<Symbol>,
    min_lot: Decimal,
    tick_size: Decimal,
    order_ids: OrderIdGenerator,
    inner: Mutex<PaperInner>,
    fills_tx: mpsc::UnboundedSender<FillEvent>,
    fills_rx: Mutex<Option<mpsc::UnboundedReceiver<FillEvent>>>,
}

#[derive(Debug)]
struct PaperInner {
    books: FnvHashMap<SymbolId, OrderBook>,
    /// Idempotency: first ack per client key within the (unbounded, in-memory) replay window.
    acks: FnvHashMap<ClientOrderId, Ack>,
    /// Venue-order resolution for cancels.
    venue_orders: FnvHashMap<VenueOrderId, (SymbolId, OrderId)>,
    /// Owner key of every order the venue has accepted, for counterparty fill reporting.
    order_keys: FnvHashMap<OrderId, ClientOrderId>,
    /// Next fill sequence per client order key.
    fill_sequences: FnvHashMap<ClientOrderId, u64>,
}

impl std::fmt::Debug for PaperExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperExchange")
            .field("venue", &self.venue)
            .field("account", &self.account)
            .field("symbols", &self.symbols)
            .finish()
    }
}

impl PaperExchange {
    pub fn new(
        venue: VenueId,
        account: AccountId,
        registry: &SymbolRegistry,
        symbols: Vec<Symbol>,
        book_config: BookConfig,
    ) -> Arc<Self> {
        let books = symbols
            .iter()
            .map(|symbol| {
                let id = registry.register(symbol.clone());
                (id, OrderBook::new(id, book_config))
            })
            .collect();
        let (fills_tx, fills_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            venue,
            account,
            symbols,
            min_lot: Decimal::new(1, 8),
            tick_size: Decimal::new(1, 8),
            order_ids: OrderIdGenerator::new(),
            inner: Mutex::new(PaperInner {
                books,
                acks: FnvHashMap::default(),
                venue_orders: FnvHashMap::default(),
                order_keys: FnvHashMap::default(),
                fill_sequences: FnvHashMap::default(),
            }),
            fills_tx,
            fills_rx: Mutex::new(Some(fills_rx)),
        })
    }

    /// Coalescing snapshot subscription for one listed symbol.
    pub fn snapshots(&self, symbol: SymbolId) -> Option<watch::Receiver<MarketSnapshot>> {
        self.inner
            .lock()
            .books
            .get(&symbol)
            .map(OrderBook::subscribe)
    }

    /// Current snapshot for one listed symbol.
    pub fn snapshot(&self, symbol: SymbolId) -> Option<MarketSnapshot> {
        self.inner.lock().books.get(&symbol).map(OrderBook::snapshot)
    }

    fn emit_fills(inner: &mut PaperInner, tx: &mpsc::UnboundedSender<FillEvent>, outcome: &SubmitOutcome) {
        let mut taker_batches = vec![(outcome.order.id, &outcome.fills)];
        for triggered in &outcome.triggered {
            taker_batches.push((triggered.order.id, &triggered.fills));
        }

        for (taker_id, fills) in taker_batches {
            for fill in fills.iter() {
                Self::emit_fill(inner, tx, taker_id, fill.clone());

                // Mirror the fill for the resting counterparty.
                if let Some(counter_id) = fill.counter_order_id {
                    let mirrored = Fill {
                        order_id: counter_id,
                        counter_order_id: Some(taker_id),
                        side: fill.side.opposite(),
                        ..fill.clone()
                    };
                    Self::emit_fill(inner, tx, counter_id, mirrored);
                }
            }
        }
    }

    fn emit_fill(
        inner: &mut PaperInner,
        tx: &mpsc::UnboundedSender<FillEvent>,
        order_id: OrderId,
        fill: Fill,
    ) {
        let Some(key) = inner.order_keys.get(&order_id).cloned() else {
            return;
        };
        let sequence = inner.fill_sequences.entry(key.clone()).or_insert(0);
        let event = FillEvent::new(key, *sequence, fill);
        *sequence += 1;
        // Receiver dropped means no account stream consumer; fills are then only in the books.
        let _ = tx.send(event);
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn venue(&self) -> VenueId {
        self.venue.clone()
    }

    fn account(&self) -> AccountId {
        self.account.clone()
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    fn min_lot(&self, _: &SymbolId) -> Decimal {
        self.min_lot
    }

    fn tick_size(&self, _: &SymbolId) -> Decimal {
        self.tick_size
    }

    async fn submit(&self, order: ClientOrder) -> Result<Ack, AdapterError> {
        let mut inner = self.inner.lock();

        if let Some(ack) = inner.acks.get(&order.key) {
            debug!(key = %order.key, "replayed submission - returning original ack");
            return Ok(ack.clone());
        }

        let Some(book) = inner.books.get_mut(&order.symbol) else {
            return Err(AdapterError::permanent(
                "EXCH_INVALID_SYMBOL",
                format!("symbol {} not listed on {}", order.symbol, self.venue),
            ));
        };

        let id = self.order_ids.next();
        let book_order = Order::new(
            id,
            order.bot.clone(),
            order.symbol,
            order.side,
            order.kind,
            order.price,
            order.quantity,
            Utc::now(),
        );

        let outcome = book
            .submit(book_order)
            .map_err(|error| AdapterError::permanent("EXCH_REJECTED", error.to_string()))?;

        let ack = Ack::new(order.key.clone(), VenueOrderId::new(format_smolstr!("{}", id.0)));
        inner.acks.insert(order.key.clone(), ack.clone());
        inner
            .venue_orders
            .insert(ack.venue_order.clone(), (order.symbol, id));
        inner.order_keys.insert(id, order.key.clone());

        Self::emit_fills(&mut inner, &self.fills_tx, &outcome);

        Ok(ack)
    }

    async fn cancel(&self, venue_order: VenueOrderId) -> Result<(), AdapterError> {
        let mut inner = self.inner.lock();

        let Some((symbol, id)) = inner.venue_orders.get(&venue_order).copied() else {
            return Err(AdapterError::permanent(
                "EXCH_UNKNOWN_ORDER",
                format!("no order {venue_order} on {}", self.venue),
            ));
        };
        let Some(book) = inner.books.get_mut(&symbol) else {
            return Err(AdapterError::permanent(
                "EXCH_INVALID_SYMBOL",
                format!("symbol {symbol} not listed on {}", self.venue),
            ));
        };

        match book.cancel(id, Utc::now()) {
            // Cancelling an already-terminal order is idempotent.
            CancelOutcome::Cancelled | CancelOutcome::Terminal => Ok(()),
            CancelOutcome::NotFound => Err(AdapterError::permanent(
                "EXCH_UNKNOWN_ORDER",
                format!("order {venue_order} not resting on {}", self.venue),
            )),
        }
    }

    async fn ticks(&self, symbol: SymbolId) -> Result<BoxStream<'static, Tick>, AdapterError> {
        let Some(receiver) = self.snapshots(symbol) else {
            return Err(AdapterError::permanent(
                "EXCH_INVALID_SYMBOL",
                format!("symbol {symbol} not listed on {}", self.venue),
            ));
        };

        let stream = WatchStream::new(receiver).filter_map(move |snapshot| {
            futures::future::ready(match (snapshot.last, snapshot.last_quantity, snapshot.last_side) {
                (Some(price), Some(size), Some(side)) => {
                    Some(Tick::new(symbol, price, size, side, snapshot.as_of))
                }
                _ => None,
            })
        });

        Ok(stream.boxed())
    }

    async fn fills(&self) -> Result<BoxStream<'static, FillEvent>, AdapterError> {
        let Some(receiver) = self.fills_rx.lock().take() else {
            return Err(AdapterError::permanent(
                "EXCH_STREAM_TAKEN",
                "account fill stream already consumed",
            ));
        };
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantor_execution::order::{OrderKind, id::BotId};
    use quantor_instrument::Side;
    use rust_decimal_macros::dec;

    fn paper() -> (Arc<PaperExchange>, SymbolId) {
        let registry = SymbolRegistry::new();
        let paper = PaperExchange::new(
            VenueId::new("paper"),
            AccountId::new("main"),
            &registry,
            vec![Symbol::new("btc", "usdt")],
            BookConfig::default(),
        );
        let symbol = registry.id(&Symbol::new("btc", "usdt")).unwrap();
        (paper, symbol)
    }

    fn client_order(
        key: &str,
        bot: &str,
        symbol: SymbolId,
        side: Side,
        kind: OrderKind,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> ClientOrder {
        ClientOrder::new(
            ClientOrderId::new(key),
            BotId::new(bot),
            symbol,
            side,
            kind,
            price,
            quantity,
        )
    }

    #[tokio::test]
    async fn test_submit_rests_and_acks() {
        let (paper, symbol) = paper();

        let ack = paper
            .submit(client_order(
                "k1",
                "maker",
                symbol,
                Side::Sell,
                OrderKind::Limit,
                Some(dec!(100)),
                dec!(1),
            ))
            .await
            .unwrap();

        assert_eq!(ack.key, ClientOrderId::new("k1"));
        let snapshot = paper.snapshot(symbol).unwrap();
        assert_eq!(snapshot.ask.map(|level| level.price), Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_replayed_key_returns_original_ack_without_second_order() {
        let (paper, symbol) = paper();
        let order = client_order(
            "k1",
            "maker",
            symbol,
            Side::Sell,
            OrderKind::Limit,
            Some(dec!(100)),
            dec!(1),
        );

        let first = paper.submit(order.clone()).await.unwrap();
        let second = paper.submit(order).await.unwrap();

        assert_eq!(first, second);
        let snapshot = paper.snapshot(symbol).unwrap();
        assert_eq!(
            snapshot.ask.map(|level| level.amount),
            Some(dec!(1)),
            "replay must not rest a second order"
        );
    }

    #[tokio::test]
    async fn test_match_reports_fills_to_both_parties() {
        let (paper, symbol) = paper();
        let mut fills = paper.fills().await.unwrap();

        paper
            .submit(client_order(
                "maker-1",
                "maker",
                symbol,
                Side::Sell,
                OrderKind::Limit,
                Some(dec!(100)),
                dec!(1),
            ))
            .await
            .unwrap();
        paper
            .submit(client_order(
                "taker-1",
                "taker",
                symbol,
                Side::Buy,
                OrderKind::Market,
                None,
                dec!(1),
            ))
            .await
            .unwrap();

        let first = fills.next().await.unwrap();
        let second = fills.next().await.unwrap();

        let keys = [first.fill.side, second.fill.side];
        assert!(keys.contains(&Side::Buy) && keys.contains(&Side::Sell));
        assert_eq!(first.fill.price, dec!(100));
        assert_eq!(second.fill.price, dec!(100));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_for_terminal_orders() {
        let (paper, symbol) = paper();

        let ack = paper
            .submit(client_order(
                "k1",
                "maker",
                symbol,
                Side::Sell,
                OrderKind::Limit,
                Some(dec!(100)),
                dec!(1),
            ))
            .await
            .unwrap();

        paper.cancel(ack.venue_order.clone()).await.unwrap();
        // Already cancelled: still Ok.
        paper.cancel(ack.venue_order).await.unwrap();

        assert!(paper.snapshot(symbol).unwrap().ask.is_none());
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_permanent_error() {
        let (paper, _) = paper();

        let result = paper
            .submit(client_order(
                "k1",
                "maker",
                SymbolId(99),
                Side::Sell,
                OrderKind::Limit,
                Some(dec!(100)),
                dec!(1),
            ))
            .await;

        assert!(matches!(result, Err(AdapterError::Permanent { .. })));
    }
}
