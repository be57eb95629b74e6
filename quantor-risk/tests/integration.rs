use chrono::{DateTime, TimeZone, Utc};
use quantor_execution::{order::id::{BotId, OrderId}, trade::Fill};
use quantor_instrument::{Side, symbol::SymbolId};
use quantor_risk::{
    guard::{MarkPolicy, RiskGuard},
    profile::RiskProfile,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn fill(id: u64, symbol: u32, side: Side, price: Decimal, quantity: Decimal, fee: Decimal) -> Fill {
    Fill {
        order_id: OrderId(id),
        counter_order_id: None,
        symbol: SymbolId(symbol),
        side,
        price,
        quantity,
        fee,
        time: now(),
    }
}

/// After every applied fill, `equity = cash + Σ quantity × mark` holds exactly and cash never
/// goes negative, across a multi-symbol fill sequence with fees.
#[test]
fn test_accounting_identity_over_fill_sequence() {
    let mut guard = RiskGuard::new(MarkPolicy::LastTrade);
    let bot = BotId::new("b1");
    guard.register_bot(bot.clone(), RiskProfile::default(), dec!(10000));

    let fills = vec![
        fill(1, 0, Side::Buy, dec!(100), dec!(10), dec!(1)),
        fill(2, 1, Side::Buy, dec!(2000), dec!(2), dec!(2)),
        fill(3, 0, Side::Sell, dec!(110), dec!(4), dec!(0.5)),
        fill(4, 0, Side::Buy, dec!(95), dec!(2), dec!(0.25)),
        fill(5, 1, Side::Sell, dec!(1900), dec!(2), dec!(2)),
        fill(6, 0, Side::Sell, dec!(120), dec!(8), dec!(1)),
    ];

    for (index, fill) in fills.into_iter().enumerate() {
        let applied = guard
            .apply_fill(&bot, &fill)
            .unwrap_or_else(|failure| panic!("fill {index} refused: {failure}"));

        let portfolio = guard.portfolio(&bot).unwrap();
        // The identity is exact - no epsilon.
        let positions_value: Decimal = portfolio
            .positions
            .values()
            .map(|position| position.quantity * portfolio.mark(&position.symbol).unwrap())
            .sum();
        assert_eq!(applied.equity, portfolio.cash + positions_value, "fill {index}");
        assert!(portfolio.cash >= Decimal::ZERO, "fill {index} overdrafted");
    }

    // Both positions were round-tripped back to zero quantity.
    let portfolio = guard.portfolio(&bot).unwrap();
    assert!(portfolio.positions.is_empty());

    // Gross realised: +40 on the first reduction, -200 closing symbol 1, +170 closing symbol 0
    // against its 98.75 rolled entry; minus 6.75 of fees.
    assert_eq!(portfolio.day_pnl, dec!(3.25));
}

/// Marking positions to a moving last-trade price drives drawdown and the breach set.
#[test]
fn test_mark_to_market_breaches_drawdown() {
    let mut guard = RiskGuard::new(MarkPolicy::LastTrade);
    let bot = BotId::new("b1");
    guard.register_bot(
        bot.clone(),
        RiskProfile {
            max_drawdown_pct: dec!(0.10),
            ..RiskProfile::default()
        },
        dec!(10000),
    );

    guard
        .apply_fill(&bot, &fill(1, 0, Side::Buy, dec!(100), dec!(20), Decimal::ZERO))
        .unwrap();

    // Rally to a new peak, then collapse 15% of peak equity.
    guard.set_mark(SymbolId(0), dec!(150));
    assert!(guard.breaches(now()).is_empty(), "no breach at the peak");

    guard.set_mark(SymbolId(0), dec!(52.5));
    let breaches = guard.breaches(now());
    assert!(
        breaches
            .iter()
            .any(|breach| breach.kind == quantor_risk::breach::BreachKind::Drawdown),
        "drawdown past 10% must breach"
    );
}
