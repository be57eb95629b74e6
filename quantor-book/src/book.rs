use crate::{
    error::{BookError, RejectReason},
    level::{DepthSide, Level},
    snapshot::MarketSnapshot,
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use quantor_instrument::{Side, symbol::SymbolId};
use quantor_execution::{
    order::{Order, OrderKind, OrderState, id::{BotId, OrderId}},
    trade::Fill,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::watch;
use tracing::debug;

/// Book construction parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BookConfig {
    /// Number of depth levels included in each published [`MarketSnapshot`].
    pub depth_levels: usize,
    /// Scale used when flooring derived base quantities.
    pub quantity_scale: u32,
    /// Scale used when ceiling derived quote amounts.
    pub price_scale: u32,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth_levels: 10,
            quantity_scale: 8,
            price_scale: 8,
        }
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// The submitted order in its post-matching state.
    pub order: Order,
    /// Fills generated for the submitted order, in match order.
    pub fills: Vec<Fill>,
    /// Present when any portion of the order now rests in the book (including parked stops).
    pub resting_id: Option<OrderId>,
    /// Parked stop orders triggered by trade prints of this submission, executed in trigger
    /// order.
    pub triggered: Vec<TriggeredStop>,
}

/// A parked stop order converted to a market order by a trade print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredStop {
    pub order: Order,
    pub fills: Vec<Fill>,
}

/// Outcome of a cancellation request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    /// The order already reached a terminal state.
    Terminal,
}

/// One resting order inside a price level FIFO queue.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Resting {
    id: OrderId,
    bot: BotId,
    remaining: Decimal,
    submitted_at: DateTime<Utc>,
}

/// Per-symbol price-time-priority order book.
///
/// Single-writer: all mutation goes through [`submit`](Self::submit) and
/// [`cancel`](Self::cancel) on the owning task. Readers consume immutable [`MarketSnapshot`]s
/// through [`subscribe`](Self::subscribe) and never block the writer.
///
/// Matching walks the opposite side from the best price while the incoming order is marketable.
/// Within a price level the earliest `submitted_at` matches first; ties at identical timestamps
/// break on the lower [`OrderId`]. Trades print at the resting order's price.
#[derive(Debug)]
pub struct OrderBook {
    symbol: SymbolId,
    config: BookConfig,
    sequence: u64,
    bids: BTreeMap<Decimal, VecDeque<Resting>>,
    asks: BTreeMap<Decimal, VecDeque<Resting>>,
    /// Parked stop orders awaiting their trigger print.
    stops: Vec<Order>,
    /// Side and price level of every resting order, for O(log n) cancellation.
    resting_index: FnvHashMap<OrderId, (Side, Decimal)>,
    /// Final state of every order that passed through the book.
    terminal: FnvHashMap<OrderId, OrderState>,
    last_trade: Option<Decimal>,
    last_trade_quantity: Option<Decimal>,
    last_trade_side: Option<Side>,
    feed: watch::Sender<MarketSnapshot>,
}

impl OrderBook {
    pub fn new(symbol: SymbolId, config: BookConfig) -> Self {
        let (feed, _) = watch::channel(MarketSnapshot::empty(symbol));
        Self {
            symbol,
            config,
            sequence: 0,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            stops: Vec::new(),
            resting_index: FnvHashMap::default(),
            terminal: FnvHashMap::default(),
            last_trade: None,
            last_trade_quantity: None,
            last_trade_side: None,
            feed,
        }
    }

    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    /// Last trade print, if any trade has occurred.
    pub fn last_trade(&self) -> Option<Decimal> {
        self.last_trade
    }

    /// Current [`MarketSnapshot`]. Readers obtain a consistent copy without blocking the writer.
    pub fn snapshot(&self) -> MarketSnapshot {
        self.feed.borrow().clone()
    }

    /// Subscribe to coalesced snapshot notifications.
    ///
    /// Slow subscribers skip intermediate snapshots but always observe the most recent one.
    pub fn subscribe(&self) -> watch::Receiver<MarketSnapshot> {
        self.feed.subscribe()
    }

    /// Submit an order for matching.
    ///
    /// Rejections are atomic - on `Err` the book is unchanged. Accepted submissions publish a
    /// fresh snapshot before returning.
    pub fn submit(&mut self, order: Order) -> Result<SubmitOutcome, BookError> {
        if order.symbol != self.symbol {
            return Err(BookError::SymbolMismatch {
                id: order.id,
                submitted: order.symbol.0,
                book: self.symbol.0,
            });
        }
        self.validate(&order)?;

        let time = order.submitted_at;
        let mut outcome = match order.kind {
            OrderKind::Market => self.submit_market(order)?,
            OrderKind::Limit => self.submit_limit(order)?,
            OrderKind::ImmediateOrCancel => self.submit_ioc(order)?,
            OrderKind::FillOrKill => self.submit_fok(order)?,
            OrderKind::Stop => self.submit_stop(order)?,
        };

        outcome.triggered = self.trigger_stops(time);
        self.terminal_record(&outcome.order);
        self.publish(time);

        Ok(outcome)
    }

    /// Cancel a resting or parked order.
    pub fn cancel(&mut self, id: OrderId, time: DateTime<Utc>) -> CancelOutcome {
        if self.terminal.contains_key(&id) {
            return CancelOutcome::Terminal;
        }

        if let Some((side, price)) = self.resting_index.remove(&id) {
            let levels = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            if let Some(queue) = levels.get_mut(&price) {
                queue.retain(|resting| resting.id != id);
                if queue.is_empty() {
                    levels.remove(&price);
                }
            }
            self.terminal.insert(id, OrderState::Cancelled);
            self.publish(time);
            return CancelOutcome::Cancelled;
        }

        if let Some(index) = self.stops.iter().position(|stop| stop.id == id) {
            self.stops.swap_remove(index);
            self.terminal.insert(id, OrderState::Cancelled);
            self.publish(time);
            return CancelOutcome::Cancelled;
        }

        CancelOutcome::NotFound
    }

    /// Cancel every resting and parked order owned by `bot`, returning the cancelled ids.
    pub fn cancel_bot(&mut self, bot: &BotId, time: DateTime<Utc>) -> Vec<OrderId> {
        let mut cancelled = Vec::new();

        for levels in [&mut self.bids, &mut self.asks] {
            levels.retain(|_, queue| {
                queue.retain(|resting| {
                    if resting.bot == *bot {
                        cancelled.push(resting.id);
                        false
                    } else {
                        true
                    }
                });
                !queue.is_empty()
            });
        }
        self.stops.retain(|stop| {
            if stop.bot == *bot {
                cancelled.push(stop.id);
                false
            } else {
                true
            }
        });

        for id in &cancelled {
            self.resting_index.remove(id);
            self.terminal.insert(*id, OrderState::Cancelled);
        }
        if !cancelled.is_empty() {
            self.publish(time);
        }

        cancelled
    }

    /// Resting order ids owned by `bot`, including parked stops.
    pub fn bot_orders(&self, bot: &BotId) -> Vec<OrderId> {
        self.bids
            .values()
            .chain(self.asks.values())
            .flatten()
            .filter(|resting| resting.bot == *bot)
            .map(|resting| resting.id)
            .chain(
                self.stops
                    .iter()
                    .filter(|stop| stop.bot == *bot)
                    .map(|stop| stop.id),
            )
            .collect()
    }

    fn validate(&self, order: &Order) -> Result<(), BookError> {
        let price_valid = match order.kind {
            OrderKind::Market => true,
            _ => order.price.is_some_and(|price| price > Decimal::ZERO),
        };
        if order.quantity <= Decimal::ZERO || !price_valid {
            return Err(BookError::Rejected {
                id: order.id,
                reason: RejectReason::Validation,
            });
        }
        Ok(())
    }

    fn submit_market(&mut self, mut order: Order) -> Result<SubmitOutcome, BookError> {
        let available = self.probe(&order, None)?;
        if available.is_zero() {
            return Err(BookError::Rejected {
                id: order.id,
                reason: RejectReason::NoLiquidity,
            });
        }

        let time = order.submitted_at;
        let fills = self.cross(&mut order, None);
        if !order.state.is_terminal() {
            // Liquidity exhausted - the unfilled remainder of a market order never rests.
            order
                .cancel(time)
                .expect("non-terminal market order accepts cancel");
        }

        Ok(SubmitOutcome {
            order,
            fills,
            resting_id: None,
            triggered: Vec::new(),
        })
    }

    fn submit_limit(&mut self, mut order: Order) -> Result<SubmitOutcome, BookError> {
        let limit = order.price.expect("limit order validated to carry a price");
        self.probe(&order, Some(limit))?;

        let fills = self.cross(&mut order, Some(limit));
        let resting_id = if order.state.is_terminal() {
            None
        } else {
            self.rest(&order);
            Some(order.id)
        };

        Ok(SubmitOutcome {
            order,
            fills,
            resting_id,
            triggered: Vec::new(),
        })
    }

    fn submit_ioc(&mut self, mut order: Order) -> Result<SubmitOutcome, BookError> {
        let limit = order.price.expect("ioc order validated to carry a price");
        self.probe(&order, Some(limit))?;

        let time = order.submitted_at;
        let fills = self.cross(&mut order, Some(limit));
        if !order.state.is_terminal() {
            order
                .cancel(time)
                .expect("non-terminal ioc order accepts cancel");
        }

        Ok(SubmitOutcome {
            order,
            fills,
            resting_id: None,
            triggered: Vec::new(),
        })
    }

    fn submit_fok(&mut self, mut order: Order) -> Result<SubmitOutcome, BookError> {
        let limit = order.price.expect("fok order validated to carry a price");
        let available = self.probe(&order, Some(limit))?;
        if available < order.quantity {
            // Fill-or-kill is atomic: a partial cross leaves no state change.
            return Err(BookError::Rejected {
                id: order.id,
                reason: RejectReason::CannotFill,
            });
        }

        let fills = self.cross(&mut order, Some(limit));
        debug_assert_eq!(order.state, OrderState::Filled);

        Ok(SubmitOutcome {
            order,
            fills,
            resting_id: None,
            triggered: Vec::new(),
        })
    }

    fn submit_stop(&mut self, order: Order) -> Result<SubmitOutcome, BookError> {
        let trigger = order.price.expect("stop order validated to carry a price");

        if self.stop_triggered(order.side, trigger) {
            // Trigger already crossed at submission - execute immediately as a market order.
            let mut market = order;
            market.kind = OrderKind::Market;
            market.price = None;
            return self.submit_market(market);
        }

        let id = order.id;
        self.stops.push(order.clone());

        Ok(SubmitOutcome {
            order,
            fills: Vec::new(),
            resting_id: Some(id),
            triggered: Vec::new(),
        })
    }

    /// Whether a trade has printed at or through the stop trigger price.
    fn stop_triggered(&self, side: Side, trigger: Decimal) -> bool {
        match (side, self.last_trade) {
            (Side::Buy, Some(last)) => last >= trigger,
            (Side::Sell, Some(last)) => last <= trigger,
            (_, None) => false,
        }
    }

    /// Convert every parked stop whose trigger has printed, in parking order, until quiescent.
    fn trigger_stops(&mut self, time: DateTime<Utc>) -> Vec<TriggeredStop> {
        let mut triggered = Vec::new();

        loop {
            let Some(index) = self
                .stops
                .iter()
                .position(|stop| {
                    let trigger = stop.price.expect("parked stop carries a trigger price");
                    self.stop_triggered(stop.side, trigger)
                })
            else {
                break;
            };

            let mut order = self.stops.remove(index);
            debug!(id = %order.id, "stop trigger printed - converting to market");
            order.kind = OrderKind::Market;
            order.price = None;

            // A triggered stop can no longer be rejected; refusal reasons collapse to
            // cancellation of the unfilled remainder.
            let fills = match self.probe(&order, None) {
                Ok(available) if !available.is_zero() => self.cross(&mut order, None),
                Ok(_) | Err(_) => Vec::new(),
            };
            if !order.state.is_terminal() {
                order
                    .cancel(time)
                    .expect("non-terminal stop order accepts cancel");
            }
            self.terminal_record(&order);

            triggered.push(TriggeredStop { order, fills });
        }

        triggered
    }

    /// Walk the opposite side best-price-first, totalling the liquidity this order would touch.
    ///
    /// Fails with [`RejectReason::SelfTrade`] if a resting order of the same bot sits inside the
    /// touched span.
    fn probe(&self, order: &Order, limit: Option<Decimal>) -> Result<Decimal, BookError> {
        let mut available = Decimal::ZERO;

        let levels: Box<dyn Iterator<Item = (&Decimal, &VecDeque<Resting>)>> = match order.side {
            Side::Buy => Box::new(self.asks.iter()),
            Side::Sell => Box::new(self.bids.iter().rev()),
        };

        'levels: for (price, queue) in levels {
            if !Self::marketable(order.side, *price, limit) {
                break;
            }
            for resting in queue {
                if resting.bot == order.bot {
                    return Err(BookError::Rejected {
                        id: order.id,
                        reason: RejectReason::SelfTrade,
                    });
                }
                available += resting.remaining;
                if available >= order.quantity {
                    break 'levels;
                }
            }
        }

        Ok(available.min(order.quantity))
    }

    fn marketable(side: Side, level_price: Decimal, limit: Option<Decimal>) -> bool {
        match (side, limit) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => level_price <= limit,
            (Side::Sell, Some(limit)) => level_price >= limit,
        }
    }

    /// Match the taker against the opposite side while marketable. Trades print at the resting
    /// price.
    fn cross(&mut self, taker: &mut Order, limit: Option<Decimal>) -> Vec<Fill> {
        let time = taker.submitted_at;
        let mut fills = Vec::new();

        while taker.remaining > Decimal::ZERO {
            let levels = match taker.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let best = match taker.side {
                Side::Buy => levels.iter_mut().next(),
                Side::Sell => levels.iter_mut().next_back(),
            };
            let Some((price, queue)) = best else {
                break;
            };
            let price = *price;
            if !Self::marketable(taker.side, price, limit) {
                break;
            }

            let resting = queue
                .front_mut()
                .expect("book never retains an empty price level");
            let quantity = taker.remaining.min(resting.remaining);

            fills.push(Fill::new(
                taker.id,
                Some(resting.id),
                self.symbol,
                taker.side,
                price,
                quantity,
                Decimal::ZERO,
                time,
            ));

            taker
                .apply_fill(quantity, time)
                .expect("fill quantity bounded by taker remaining");

            resting.remaining -= quantity;
            if resting.remaining.is_zero() {
                let id = resting.id;
                queue.pop_front();
                self.resting_index.remove(&id);
                self.terminal.insert(id, OrderState::Filled);
            }
            if queue.is_empty() {
                levels.remove(&price);
            }

            self.last_trade = Some(price);
            self.last_trade_quantity = Some(quantity);
            self.last_trade_side = Some(taker.side);
        }

        fills
    }

    /// Rest the unfilled remainder of a limit order at its price level.
    ///
    /// Queue position preserves `(submitted_at, id)` order inside the level.
    fn rest(&mut self, order: &Order) {
        let price = order.price.expect("resting order carries a price");
        let resting = Resting {
            id: order.id,
            bot: order.bot.clone(),
            remaining: order.remaining,
            submitted_at: order.submitted_at,
        };

        let levels = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let queue = levels.entry(price).or_default();
        let index = queue
            .partition_point(|other| (other.submitted_at, other.id) <= (resting.submitted_at, resting.id));
        queue.insert(index, resting);

        self.resting_index.insert(order.id, (order.side, price));
    }

    fn terminal_record(&mut self, order: &Order) {
        if order.state.is_terminal() {
            self.terminal.insert(order.id, order.state);
        }
    }

    /// Assemble and publish a fresh snapshot. Sequence numbers strictly increase.
    fn publish(&mut self, time: DateTime<Utc>) {
        self.sequence += 1;

        let bid_levels = self
            .bids
            .iter()
            .rev()
            .take(self.config.depth_levels)
            .map(|(price, queue)| Level::new(*price, queue.iter().map(|r| r.remaining).sum()))
            .collect::<Vec<_>>();
        let ask_levels = self
            .asks
            .iter()
            .take(self.config.depth_levels)
            .map(|(price, queue)| Level::new(*price, queue.iter().map(|r| r.remaining).sum()))
            .collect::<Vec<_>>();

        let snapshot = MarketSnapshot {
            symbol: self.symbol,
            sequence: self.sequence,
            bid: bid_levels.first().copied(),
            ask: ask_levels.first().copied(),
            last: self.last_trade,
            last_quantity: self.last_trade_quantity,
            last_side: self.last_trade_side,
            bid_depth: DepthSide::bids(bid_levels),
            ask_depth: DepthSide::asks(ask_levels),
            as_of: time,
        };

        self.feed.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use quantor_execution::order::id::BotId;
    use rust_decimal_macros::dec;

    fn time(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(seconds)
    }

    fn order(
        id: u64,
        bot: &str,
        side: Side,
        kind: OrderKind,
        price: Option<Decimal>,
        quantity: Decimal,
        at: i64,
    ) -> Order {
        Order::new(
            OrderId(id),
            BotId::new(bot),
            SymbolId(0),
            side,
            kind,
            price,
            quantity,
            time(at),
        )
    }

    fn book() -> OrderBook {
        OrderBook::new(SymbolId(0), BookConfig::default())
    }

    fn limit(id: u64, bot: &str, side: Side, price: Decimal, quantity: Decimal, at: i64) -> Order {
        order(id, bot, side, OrderKind::Limit, Some(price), quantity, at)
    }

    #[test]
    fn test_limit_orders_rest_and_publish_depth() {
        let mut book = book();

        book.submit(limit(1, "maker_a", Side::Buy, dec!(99), dec!(1), 0)).unwrap();
        book.submit(limit(2, "maker_a", Side::Buy, dec!(98), dec!(2), 1)).unwrap();
        book.submit(limit(3, "maker_b", Side::Sell, dec!(101), dec!(1), 2)).unwrap();

        let snapshot = book.snapshot();
        assert_eq!(snapshot.bid, Some(Level::new(dec!(99), dec!(1))));
        assert_eq!(snapshot.ask, Some(Level::new(dec!(101), dec!(1))));
        assert_eq!(snapshot.bid_depth.levels().len(), 2);
        assert_eq!(snapshot.last, None);
    }

    #[test]
    fn test_market_crosses_best_price_first() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(101), dec!(1), 0)).unwrap();
        book.submit(limit(2, "maker", Side::Sell, dec!(100), dec!(1), 1)).unwrap();

        let outcome = book
            .submit(order(3, "taker", Side::Buy, OrderKind::Market, None, dec!(2), 2))
            .unwrap();

        assert_eq!(outcome.order.state, OrderState::Filled);
        assert_eq!(
            outcome.fills.iter().map(|f| f.price).collect::<Vec<_>>(),
            vec![dec!(100), dec!(101)]
        );
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let mut book = book();
        book.submit(limit(1, "maker_a", Side::Sell, dec!(100), dec!(1), 5)).unwrap();
        book.submit(limit(2, "maker_b", Side::Sell, dec!(100), dec!(1), 3)).unwrap();

        let outcome = book
            .submit(order(3, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 6))
            .unwrap();

        // maker_b submitted earlier, so fills first despite arriving second.
        assert_eq!(outcome.fills[0].counter_order_id, Some(OrderId(2)));
    }

    #[test]
    fn test_identical_timestamps_break_on_lower_id() {
        let mut book = book();
        book.submit(limit(7, "maker_a", Side::Sell, dec!(100), dec!(1), 3)).unwrap();
        book.submit(limit(4, "maker_b", Side::Sell, dec!(100), dec!(1), 3)).unwrap();

        let outcome = book
            .submit(order(9, "taker", Side::Buy, OrderKind::Market, None, dec!(2), 4))
            .unwrap();

        assert_eq!(
            outcome
                .fills
                .iter()
                .map(|f| f.counter_order_id)
                .collect::<Vec<_>>(),
            vec![Some(OrderId(4)), Some(OrderId(7))]
        );
    }

    #[test]
    fn test_market_against_empty_book_is_rejected() {
        let mut book = book();
        let result = book.submit(order(1, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 0));

        assert_eq!(
            result,
            Err(BookError::Rejected {
                id: OrderId(1),
                reason: RejectReason::NoLiquidity,
            })
        );
        // Rejection publishes nothing.
        assert_eq!(book.snapshot().sequence, 0);
    }

    #[test]
    fn test_market_remainder_is_cancelled_on_exhausted_liquidity() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(1), 0)).unwrap();

        let outcome = book
            .submit(order(2, "taker", Side::Buy, OrderKind::Market, None, dec!(3), 1))
            .unwrap();

        assert_eq!(outcome.order.state, OrderState::Cancelled);
        assert_eq!(outcome.order.remaining, dec!(2));
        assert_eq!(outcome.fills.len(), 1);
        // Order conservation: fills + remaining = quantity.
        let filled: Decimal = outcome.fills.iter().map(|f| f.quantity).sum();
        assert_eq!(filled + outcome.order.remaining, outcome.order.quantity);
    }

    #[test]
    fn test_limit_crosses_marketable_portion_then_rests() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(1), 0)).unwrap();

        let outcome = book
            .submit(limit(2, "taker", Side::Buy, dec!(100.5), dec!(2), 1))
            .unwrap();

        assert_eq!(outcome.order.state, OrderState::PartiallyFilled);
        assert_eq!(outcome.resting_id, Some(OrderId(2)));
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(
            book.snapshot().bid,
            Some(Level::new(dec!(100.5), dec!(1)))
        );
    }

    #[test]
    fn test_ioc_cancels_remainder() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(1), 0)).unwrap();

        let outcome = book
            .submit(order(
                2,
                "taker",
                Side::Buy,
                OrderKind::ImmediateOrCancel,
                Some(dec!(100)),
                dec!(2),
                1,
            ))
            .unwrap();

        assert_eq!(outcome.order.state, OrderState::Cancelled);
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.resting_id, None);
        assert!(book.snapshot().bid.is_none());
    }

    #[test]
    fn test_fok_fills_entirely_or_rejects_without_state_change() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(1), 0)).unwrap();
        let sequence_before = book.snapshot().sequence;

        // Partial cross only - rejected atomically.
        let result = book.submit(order(
            2,
            "taker",
            Side::Buy,
            OrderKind::FillOrKill,
            Some(dec!(100)),
            dec!(2),
            1,
        ));
        assert_eq!(
            result,
            Err(BookError::Rejected {
                id: OrderId(2),
                reason: RejectReason::CannotFill,
            })
        );
        assert_eq!(book.snapshot().sequence, sequence_before);
        assert_eq!(book.snapshot().ask, Some(Level::new(dec!(100), dec!(1))));

        // Exact liquidity - fills in full.
        let outcome = book
            .submit(order(
                3,
                "taker",
                Side::Buy,
                OrderKind::FillOrKill,
                Some(dec!(100)),
                dec!(1),
                2,
            ))
            .unwrap();
        assert_eq!(outcome.order.state, OrderState::Filled);
    }

    #[test]
    fn test_stop_parks_then_triggers_on_print() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(105), dec!(1), 0)).unwrap();

        // Stop-buy triggering at 104 parks: no trade has printed yet.
        let outcome = book
            .submit(order(2, "stopper", Side::Buy, OrderKind::Stop, Some(dec!(104)), dec!(1), 1))
            .unwrap();
        assert_eq!(outcome.resting_id, Some(OrderId(2)));
        assert!(outcome.fills.is_empty());

        // A print at 105 crosses the trigger and converts the stop to a market order.
        book.submit(limit(3, "maker", Side::Sell, dec!(105), dec!(1), 2)).unwrap();
        let outcome = book
            .submit(order(4, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 3))
            .unwrap();

        assert_eq!(outcome.triggered.len(), 1);
        let triggered = &outcome.triggered[0];
        assert_eq!(triggered.order.id, OrderId(2));
        assert_eq!(triggered.order.state, OrderState::Filled);
        assert_eq!(triggered.fills.len(), 1);
    }

    #[test]
    fn test_stop_with_trigger_already_crossed_executes_immediately() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(2), 0)).unwrap();
        // Print a trade at 100.
        book.submit(order(2, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 1)).unwrap();

        let outcome = book
            .submit(order(3, "stopper", Side::Buy, OrderKind::Stop, Some(dec!(99)), dec!(1), 2))
            .unwrap();

        assert_eq!(outcome.order.state, OrderState::Filled);
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.resting_id, None);
    }

    #[test]
    fn test_self_trade_is_rejected_before_any_mutation() {
        let mut book = book();
        book.submit(limit(1, "bot_1", Side::Sell, dec!(100), dec!(1), 0)).unwrap();
        let before = book.snapshot();

        let result = book.submit(order(2, "bot_1", Side::Buy, OrderKind::Market, None, dec!(1), 1));

        assert_eq!(
            result,
            Err(BookError::Rejected {
                id: OrderId(2),
                reason: RejectReason::SelfTrade,
            })
        );
        assert_eq!(book.snapshot(), before);
    }

    #[test]
    fn test_cancel_outcomes() {
        let mut book = book();
        book.submit(limit(1, "maker", Side::Sell, dec!(100), dec!(1), 0)).unwrap();
        book.submit(order(2, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 1)).unwrap();

        // Order 1 filled - terminal.
        assert_eq!(book.cancel(OrderId(1), time(2)), CancelOutcome::Terminal);
        // Order 99 never existed.
        assert_eq!(book.cancel(OrderId(99), time(2)), CancelOutcome::NotFound);

        book.submit(limit(3, "maker", Side::Sell, dec!(101), dec!(1), 3)).unwrap();
        assert_eq!(book.cancel(OrderId(3), time(4)), CancelOutcome::Cancelled);
        assert!(book.snapshot().ask.is_none());
        // Cancelling twice reports terminal.
        assert_eq!(book.cancel(OrderId(3), time(5)), CancelOutcome::Terminal);
    }

    #[test]
    fn test_cancel_bot_clears_resting_and_parked_orders() {
        let mut book = book();
        book.submit(limit(1, "bot_1", Side::Buy, dec!(99), dec!(1), 0)).unwrap();
        book.submit(limit(2, "bot_1", Side::Sell, dec!(101), dec!(1), 1)).unwrap();
        book.submit(order(3, "bot_1", Side::Sell, OrderKind::Stop, Some(dec!(95)), dec!(1), 2)).unwrap();
        book.submit(limit(4, "bot_2", Side::Buy, dec!(98), dec!(1), 3)).unwrap();

        let mut cancelled = book.cancel_bot(&BotId::new("bot_1"), time(4));
        cancelled.sort();

        assert_eq!(cancelled, vec![OrderId(1), OrderId(2), OrderId(3)]);
        assert!(book.bot_orders(&BotId::new("bot_1")).is_empty());
        assert_eq!(book.bot_orders(&BotId::new("bot_2")), vec![OrderId(4)]);
    }

    #[test]
    fn test_snapshot_sequence_strictly_increases() {
        let mut book = book();
        let mut last = book.snapshot().sequence;

        for id in 0..5 {
            book.submit(limit(id, "maker", Side::Buy, dec!(99), dec!(1), id as i64)).unwrap();
            let sequence = book.snapshot().sequence;
            assert!(sequence > last, "sequence must strictly increase");
            last = sequence;
        }
    }

    #[test]
    fn test_subscribers_coalesce_to_most_recent() {
        let mut book = book();
        let mut subscriber = book.subscribe();

        for id in 0..10 {
            book.submit(limit(id, "maker", Side::Buy, dec!(99), dec!(1), id as i64)).unwrap();
        }

        // A slow subscriber sees only the freshest snapshot.
        assert!(subscriber.has_changed().unwrap());
        let seen = subscriber.borrow_and_update().clone();
        assert_eq!(seen.sequence, 10);
        assert!(!subscriber.has_changed().unwrap());
    }

    #[test]
    fn test_validation_rejects_non_positive_price_and_quantity() {
        let mut book = book();

        let result = book.submit(limit(1, "maker", Side::Buy, dec!(0), dec!(1), 0));
        assert_eq!(
            result,
            Err(BookError::Rejected {
                id: OrderId(1),
                reason: RejectReason::Validation,
            })
        );

        let result = book.submit(limit(2, "maker", Side::Buy, dec!(100), dec!(0), 0));
        assert_eq!(
            result,
            Err(BookError::Rejected {
                id: OrderId(2),
                reason: RejectReason::Validation,
            })
        );
    }
}
