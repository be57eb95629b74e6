use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use quantor_book::book::{BookConfig, OrderBook};
use quantor_execution::order::{Order, OrderKind, OrderState, id::{BotId, OrderId}};
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
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

/// A mixed order-flow session: every order conserves quantity and the book never double-fills.
#[test]
fn test_mixed_flow_conserves_order_quantity() {
    let mut book = OrderBook::new(SymbolId(0), BookConfig::default());

    // Build a two-sided ladder from three makers.
    for (id, (bot, side, price)) in [
        ("maker_a", Side::Buy, dec!(99)),
        ("maker_a", Side::Buy, dec!(98)),
        ("maker_b", Side::Sell, dec!(101)),
        ("maker_b", Side::Sell, dec!(102)),
        ("maker_c", Side::Sell, dec!(101)),
    ]
    .into_iter()
    .enumerate()
    {
        let id = id as u64 + 1;
        book.submit(order(id, bot, side, OrderKind::Limit, Some(price), dec!(2), id as i64))
            .unwrap();
    }

    // Aggressive flow: a market buy sweeping one level, an IOC sell, a crossing limit.
    let flows = vec![
        order(6, "taker_1", Side::Buy, OrderKind::Market, None, dec!(3), 10),
        order(
            7,
            "taker_2",
            Side::Sell,
            OrderKind::ImmediateOrCancel,
            Some(dec!(99)),
            dec!(3),
            11,
        ),
        order(
            8,
            "taker_3",
            Side::Buy,
            OrderKind::Limit,
            Some(dec!(102)),
            dec!(4),
            12,
        ),
    ];

    for flow in flows {
        let quantity = flow.quantity;
        let outcome = book.submit(flow).unwrap();
        let filled: Decimal = outcome.fills.iter().map(|fill| fill.quantity).sum();
        // Conservation: fills + remaining = quantity, and terminal orders have nothing left
        // outstanding in the book.
        assert_eq!(filled + outcome.order.remaining, quantity);
        if outcome.order.state == OrderState::Filled {
            assert_eq!(outcome.order.remaining, Decimal::ZERO);
        }
    }
}

/// Stop orders cascade: one print can trigger a stop whose own prints trigger the next.
#[test]
fn test_stop_cascade_triggers_in_sequence() {
    let mut book = OrderBook::new(SymbolId(0), BookConfig::default());

    // Ask ladder supplying the cascade.
    book.submit(order(1, "maker", Side::Sell, OrderKind::Limit, Some(dec!(100)), dec!(1), 0))
        .unwrap();
    book.submit(order(2, "maker", Side::Sell, OrderKind::Limit, Some(dec!(105)), dec!(1), 1))
        .unwrap();
    book.submit(order(3, "maker", Side::Sell, OrderKind::Limit, Some(dec!(110)), dec!(1), 2))
        .unwrap();

    // Two parked stop-buys: the first triggers at 100, its fill at 105 triggers the second.
    book.submit(order(4, "stop_a", Side::Buy, OrderKind::Stop, Some(dec!(100)), dec!(1), 3))
        .unwrap();
    book.submit(order(5, "stop_b", Side::Buy, OrderKind::Stop, Some(dec!(105)), dec!(1), 4))
        .unwrap();

    let outcome = book
        .submit(order(6, "taker", Side::Buy, OrderKind::Market, None, dec!(1), 5))
        .unwrap();

    assert_eq!(outcome.fills[0].price, dec!(100));
    assert_eq!(outcome.triggered.len(), 2, "both stops fired");
    assert_eq!(outcome.triggered[0].order.id, OrderId(4));
    assert_eq!(outcome.triggered[0].fills[0].price, dec!(105));
    assert_eq!(outcome.triggered[1].order.id, OrderId(5));
    assert_eq!(outcome.triggered[1].fills[0].price, dec!(110));
    assert_eq!(book.last_trade(), Some(dec!(110)));
}

/// Price priority beats time priority across levels; time decides inside one level.
#[test]
fn test_price_then_time_priority_across_levels() {
    let mut book = OrderBook::new(SymbolId(0), BookConfig::default());

    // Older order at a worse price, newer order at a better price.
    book.submit(order(1, "maker_a", Side::Sell, OrderKind::Limit, Some(dec!(102)), dec!(1), 0))
        .unwrap();
    book.submit(order(2, "maker_b", Side::Sell, OrderKind::Limit, Some(dec!(101)), dec!(1), 5))
        .unwrap();
    // Same level as order 2, later submission.
    book.submit(order(3, "maker_c", Side::Sell, OrderKind::Limit, Some(dec!(101)), dec!(1), 6))
        .unwrap();

    let outcome = book
        .submit(order(4, "taker", Side::Buy, OrderKind::Market, None, dec!(3), 7))
        .unwrap();

    assert_eq!(
        outcome
            .fills
            .iter()
            .map(|fill| fill.counter_order_id)
            .collect::<Vec<_>>(),
        vec![Some(OrderId(2)), Some(OrderId(3)), Some(OrderId(1))]
    );
}
