use crate::{error::RiskError, position::Position, var::ValueAtRisk};
use fnv::FnvHashMap;
use quantor_execution::trade::Fill;
use quantor_instrument::symbol::SymbolId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rolling window of fill-to-fill equity returns backing the portfolio's value-at-risk.
const VAR_WINDOW: usize = 20;

/// Aggregate of cash and positions for one bot, with derived equity and drawdown.
///
/// Invariant: `equity = cash + Σ position.quantity × mark` exactly, after every applied fill.
/// Mark prices default to the last trade print per symbol (see
/// [`MarkPolicy`](crate::guard::MarkPolicy)).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: FnvHashMap<SymbolId, Position>,
    /// Realised P&L accumulated since the last day roll.
    pub day_pnl: Decimal,
    pub start_of_day_equity: Decimal,
    pub peak_equity: Decimal,
    marks: FnvHashMap<SymbolId, Decimal>,
    var: ValueAtRisk,
}

/// Result of applying one fill to a [`Portfolio`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FillApplied {
    pub realised_delta: Decimal,
    /// Present when the fill returned the position to zero quantity.
    pub closed: Option<Position>,
    pub equity: Decimal,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: FnvHashMap::default(),
            day_pnl: Decimal::ZERO,
            start_of_day_equity: cash,
            peak_equity: cash,
            marks: FnvHashMap::default(),
            var: ValueAtRisk::new(VAR_WINDOW),
        }
    }

    /// Mark price for a symbol, if one has been observed.
    pub fn mark(&self, symbol: &SymbolId) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    /// Record a new mark price and refresh unrealised P&L and peak equity.
    pub fn set_mark(&mut self, symbol: SymbolId, price: Decimal) {
        self.marks.insert(symbol, price);
        if let Some(position) = self.positions.get_mut(&symbol) {
            position.refresh_unrealised(price);
        }
        self.refresh_peak();
    }

    /// Total signed value of all positions at current marks.
    pub fn positions_value(&self) -> Decimal {
        self.positions
            .values()
            .map(|position| {
                let mark = self
                    .marks
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.entry_price_average);
                position.value(mark)
            })
            .sum()
    }

    /// Total absolute exposure of all positions at current marks.
    pub fn gross_exposure(&self) -> Decimal {
        self.positions
            .values()
            .map(|position| {
                let mark = self
                    .marks
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.entry_price_average);
                position.value(mark).abs()
            })
            .sum()
    }

    /// `equity = cash + Σ position.quantity × mark`.
    pub fn equity(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    /// `max(0, (peak_equity - equity) / peak_equity)`.
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity()) / self.peak_equity).max(Decimal::ZERO)
    }

    /// Value-at-risk at the given confidence over the rolling window of fill-to-fill equity
    /// returns, as a positive loss fraction. `None` until two fills have been applied.
    pub fn value_at_risk(&self, confidence: Decimal) -> Option<Decimal> {
        self.var.value_at_risk(confidence)
    }

    /// Apply a fill: adjust cash by `price × quantity ± fee`, update the position, fold
    /// realised P&L into `day_pnl`, retire the position at zero quantity and refresh peak
    /// equity.
    ///
    /// Fails with [`RiskError::Overdraft`] if the fill would drive cash negative - the caller
    /// must have gated the order beforehand, so this is an invariant violation.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<FillApplied, RiskError> {
        let notional = fill.price * fill.quantity;
        let cash_after = match fill.side {
            quantor_instrument::Side::Buy => self.cash - notional - fill.fee,
            quantor_instrument::Side::Sell => self.cash + notional - fill.fee,
        };
        if cash_after < Decimal::ZERO {
            return Err(RiskError::Overdraft {
                cash: self.cash,
                required: notional + fill.fee,
            });
        }
        self.cash = cash_after;

        let position = self
            .positions
            .entry(fill.symbol)
            .or_insert_with(|| Position::new(fill.symbol));
        let update = position.apply_fill(fill.side, fill.price, fill.quantity, fill.fee);
        self.day_pnl += update.realised_delta;
        self.marks.insert(fill.symbol, fill.price);

        let closed = if update.closed {
            let closed = self.positions.remove(&fill.symbol);
            debug!(symbol = ?fill.symbol, "position returned to zero and was retired");
            closed
        } else {
            None
        };

        self.refresh_peak();
        let equity = self.equity();
        self.var.observe(equity);

        Ok(FillApplied {
            realised_delta: update.realised_delta,
            closed,
            equity,
        })
    }

    /// Roll the trading day: reset `day_pnl` and re-anchor `start_of_day_equity`.
    pub fn roll_day(&mut self) {
        self.day_pnl = Decimal::ZERO;
        self.start_of_day_equity = self.equity();
    }

    /// Verify the accounting identity by recomputing every position's unrealised P&L from the
    /// current marks. A mismatch means double-applied or missed state and is fatal.
    pub fn audit(&self) -> Result<(), RiskError> {
        for position in self.positions.values() {
            let Some(mark) = self.marks.get(&position.symbol) else {
                continue;
            };
            let expected = (*mark - position.entry_price_average) * position.quantity;
            if expected != position.pnl_unrealised {
                return Err(RiskError::AccountingMismatch {
                    symbol: position.symbol,
                    expected,
                    actual: position.pnl_unrealised,
                });
            }
        }
        Ok(())
    }

    fn refresh_peak(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quantor_execution::order::id::OrderId;
    use quantor_instrument::Side;
    use rust_decimal_macros::dec;

    fn fill(side: Side, price: Decimal, quantity: Decimal, fee: Decimal) -> Fill {
        Fill {
            order_id: OrderId(1),
            counter_order_id: None,
            symbol: SymbolId(0),
            side,
            price,
            quantity,
            fee,
            time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_buy_fill_preserves_accounting_identity() {
        let mut portfolio = Portfolio::new(dec!(1000));

        let applied = portfolio
            .apply_fill(&fill(Side::Buy, dec!(20000), dec!(0.005), Decimal::ZERO))
            .unwrap();

        assert_eq!(portfolio.cash, dec!(900));
        assert_eq!(applied.equity, dec!(1000.000));
        // equity = cash + quantity * mark, exactly.
        assert_eq!(
            portfolio.equity(),
            portfolio.cash + dec!(0.005) * dec!(20000)
        );
        assert!(portfolio.audit().is_ok());
    }

    #[test]
    fn test_round_trip_realises_into_day_pnl() {
        let mut portfolio = Portfolio::new(dec!(1100));

        portfolio
            .apply_fill(&fill(Side::Buy, dec!(1040), dec!(1), Decimal::ZERO))
            .unwrap();
        let applied = portfolio
            .apply_fill(&fill(Side::Sell, dec!(1060), dec!(1), Decimal::ZERO))
            .unwrap();

        assert_eq!(applied.realised_delta, dec!(20));
        assert!(applied.closed.is_some());
        assert_eq!(portfolio.day_pnl, dec!(20));
        assert_eq!(portfolio.cash, dec!(1120));
        assert!(portfolio.positions.is_empty(), "zero position is retired");
    }

    #[test]
    fn test_overdraft_is_refused() {
        let mut portfolio = Portfolio::new(dec!(50));

        let result = portfolio.apply_fill(&fill(Side::Buy, dec!(100), dec!(1), Decimal::ZERO));

        assert!(matches!(result, Err(RiskError::Overdraft { .. })));
        assert_eq!(portfolio.cash, dec!(50), "refused fill leaves cash untouched");
    }

    #[test]
    fn test_fees_come_out_of_cash() {
        let mut portfolio = Portfolio::new(dec!(1000));

        portfolio
            .apply_fill(&fill(Side::Buy, dec!(100), dec!(1), dec!(1)))
            .unwrap();
        assert_eq!(portfolio.cash, dec!(899));

        portfolio
            .apply_fill(&fill(Side::Sell, dec!(100), dec!(1), dec!(1)))
            .unwrap();
        assert_eq!(portfolio.cash, dec!(998));
        assert_eq!(portfolio.day_pnl, dec!(-2));
    }

    #[test]
    fn test_drawdown_tracks_peak() {
        let mut portfolio = Portfolio::new(dec!(1000));
        portfolio
            .apply_fill(&fill(Side::Buy, dec!(100), dec!(2), Decimal::ZERO))
            .unwrap();

        // Mark up: equity 1100, new peak.
        portfolio.set_mark(SymbolId(0), dec!(150));
        assert_eq!(portfolio.equity(), dec!(1100));
        assert_eq!(portfolio.drawdown(), Decimal::ZERO);

        // Mark down: equity 960, drawdown (1100 - 960) / 1100.
        portfolio.set_mark(SymbolId(0), dec!(80));
        assert_eq!(portfolio.equity(), dec!(960));
        assert_eq!(portfolio.drawdown(), dec!(140) / dec!(1100));
    }

    #[test]
    fn test_value_at_risk_tracks_fill_to_fill_returns() {
        let mut portfolio = Portfolio::new(dec!(1000));
        assert_eq!(portfolio.value_at_risk(dec!(0.99)), None);

        portfolio
            .apply_fill(&fill(Side::Buy, dec!(100), dec!(10), Decimal::ZERO))
            .unwrap();
        // The first fill seeds the equity series - no return yet.
        assert_eq!(portfolio.value_at_risk(dec!(0.99)), None);

        portfolio
            .apply_fill(&fill(Side::Sell, dec!(90), dec!(10), Decimal::ZERO))
            .unwrap();
        // Equity fell 1000 -> 900: a 10% loss sits at the tail.
        assert_eq!(portfolio.value_at_risk(dec!(0.99)), Some(dec!(0.1)));
    }

    #[test]
    fn test_roll_day_reanchors() {
        let mut portfolio = Portfolio::new(dec!(1000));
        portfolio
            .apply_fill(&fill(Side::Buy, dec!(100), dec!(1), dec!(5)))
            .unwrap();
        assert_eq!(portfolio.day_pnl, dec!(-5));

        portfolio.roll_day();
        assert_eq!(portfolio.day_pnl, Decimal::ZERO);
        assert_eq!(portfolio.start_of_day_equity, portfolio.equity());
    }
}
