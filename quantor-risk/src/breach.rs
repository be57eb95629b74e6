use crate::{portfolio::Portfolio, profile::RiskProfile};
use chrono::{DateTime, Utc};
use derive_more::Display;
use quantor_execution::order::id::BotId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Red-threshold circuit breakers.
///
/// A breach forces the affected bot to `Paused` (operator resume required) after its resting
/// orders are cancelled.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum BreachKind {
    DailyLoss,
    Drawdown,
    Exposure,
}

/// One crossed risk threshold.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RiskBreach {
    pub bot: BotId,
    pub kind: BreachKind,
    pub observed: Decimal,
    pub limit: Decimal,
    pub time: DateTime<Utc>,
}

/// Evaluate every circuit breaker for one bot's portfolio.
pub fn check_breaches(
    bot: &BotId,
    portfolio: &Portfolio,
    profile: &RiskProfile,
    now: DateTime<Utc>,
) -> Vec<RiskBreach> {
    let mut breaches = Vec::new();

    let daily_loss_limit = profile.max_daily_loss_pct * portfolio.start_of_day_equity;
    if portfolio.day_pnl < -daily_loss_limit {
        breaches.push(RiskBreach {
            bot: bot.clone(),
            kind: BreachKind::DailyLoss,
            observed: portfolio.day_pnl,
            limit: -daily_loss_limit,
            time: now,
        });
    }

    let drawdown = portfolio.drawdown();
    if drawdown > profile.max_drawdown_pct {
        breaches.push(RiskBreach {
            bot: bot.clone(),
            kind: BreachKind::Drawdown,
            observed: drawdown,
            limit: profile.max_drawdown_pct,
            time: now,
        });
    }

    let equity = portfolio.equity();
    if equity > Decimal::ZERO {
        let exposure = portfolio.gross_exposure() / equity;
        if exposure > profile.max_exposure_pct {
            breaches.push(RiskBreach {
                bot: bot.clone(),
                kind: BreachKind::Exposure,
                observed: exposure,
                limit: profile.max_exposure_pct,
                time: now,
            });
        }
    }

    breaches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quantor_execution::{order::id::OrderId, trade::Fill};
    use quantor_instrument::{Side, symbol::SymbolId};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn fill(side: Side, price: Decimal, quantity: Decimal) -> Fill {
        Fill {
            order_id: OrderId(1),
            counter_order_id: None,
            symbol: SymbolId(0),
            side,
            price,
            quantity,
            fee: Decimal::ZERO,
            time: now(),
        }
    }

    #[test]
    fn test_daily_loss_breach() {
        let bot = BotId::new("b1");
        let mut portfolio = Portfolio::new(dec!(10000));
        let profile = RiskProfile::default();

        // Lose 600 on a round trip: beyond the 5% (500) daily budget.
        portfolio.apply_fill(&fill(Side::Buy, dec!(100), dec!(10))).unwrap();
        portfolio.apply_fill(&fill(Side::Sell, dec!(40), dec!(10))).unwrap();

        let breaches = check_breaches(&bot, &portfolio, &profile, now());
        assert!(breaches.iter().any(|b| b.kind == BreachKind::DailyLoss));
    }

    #[test]
    fn test_exposure_breach() {
        let bot = BotId::new("b1");
        let mut portfolio = Portfolio::new(dec!(1000));
        let profile = RiskProfile {
            max_exposure_pct: dec!(0.5),
            ..RiskProfile::default()
        };

        portfolio.apply_fill(&fill(Side::Buy, dec!(100), dec!(8))).unwrap();

        let breaches = check_breaches(&bot, &portfolio, &profile, now());
        assert!(breaches.iter().any(|b| b.kind == BreachKind::Exposure));
    }

    #[test]
    fn test_healthy_portfolio_has_no_breaches() {
        let bot = BotId::new("b1");
        let mut portfolio = Portfolio::new(dec!(10000));
        let profile = RiskProfile::default();

        portfolio.apply_fill(&fill(Side::Buy, dec!(100), dec!(5))).unwrap();

        assert!(check_breaches(&bot, &portfolio, &profile, now()).is_empty());
    }
}
