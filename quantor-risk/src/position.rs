use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

/// Net holding in one symbol for one bot.
///
/// `quantity` is signed: positive = long, negative = short. The entry price rolls as a
/// volume-weighted average across adds; reductions realise P&L against it. A position lives as
/// long as `quantity != 0`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: SymbolId,
    pub quantity: Decimal,
    pub entry_price_average: Decimal,
    pub pnl_realised: Decimal,
    pub pnl_unrealised: Decimal,
}

/// Result of applying one fill to a [`Position`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PositionUpdate {
    /// Realised P&L delta produced by this fill (fees included).
    pub realised_delta: Decimal,
    /// Whether the position returned to zero quantity and should be retired.
    pub closed: bool,
}

impl Position {
    pub fn new(symbol: SymbolId) -> Self {
        Self {
            symbol,
            quantity: Decimal::ZERO,
            entry_price_average: Decimal::ZERO,
            pnl_realised: Decimal::ZERO,
            pnl_unrealised: Decimal::ZERO,
        }
    }

    /// Signed value of the position at `mark`.
    pub fn value(&self, mark: Decimal) -> Decimal {
        self.quantity * mark
    }

    /// Apply a fill, rolling the volume-weighted entry on adds and realising P&L on
    /// reductions. A fill larger than the open quantity flips the position: the old side is
    /// realised in full and the remainder opens at the fill price.
    pub fn apply_fill(
        &mut self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
    ) -> PositionUpdate {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };

        let mut realised_delta = -fee;

        if self.quantity.is_zero() || self.quantity.signum() == signed.signum() {
            // Open or increase: roll the volume-weighted average entry.
            let total = self.quantity.abs() + signed.abs();
            self.entry_price_average = (self.entry_price_average * self.quantity.abs()
                + price * signed.abs())
                / total;
            self.quantity += signed;
        } else {
            let closing = self.quantity.abs().min(signed.abs());
            // Long realises (price - entry), short realises (entry - price).
            let per_unit = (price - self.entry_price_average) * self.quantity.signum();
            realised_delta += per_unit * closing;
            self.quantity += signed;

            if self.quantity.signum() == signed.signum() && !self.quantity.is_zero() {
                // Flipped through zero: the remainder opens a fresh position at the fill price.
                self.entry_price_average = price;
            }
        }

        self.pnl_realised += realised_delta;
        self.refresh_unrealised(price);

        PositionUpdate {
            realised_delta,
            closed: self.quantity.is_zero(),
        }
    }

    /// Refresh `pnl_unrealised` against a new mark price.
    pub fn refresh_unrealised(&mut self, mark: Decimal) {
        self.pnl_unrealised = (mark - self.entry_price_average) * self.quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_and_increase_rolls_vwap_entry() {
        let mut position = Position::new(SymbolId(0));

        position.apply_fill(Side::Buy, dec!(100), dec!(1), Decimal::ZERO);
        assert_eq!(position.entry_price_average, dec!(100));

        position.apply_fill(Side::Buy, dec!(200), dec!(1), Decimal::ZERO);
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.entry_price_average, dec!(150));
    }

    #[test]
    fn test_reduction_realises_pnl() {
        let mut position = Position::new(SymbolId(0));
        position.apply_fill(Side::Buy, dec!(1040), dec!(1), Decimal::ZERO);

        let update = position.apply_fill(Side::Sell, dec!(1060), dec!(1), Decimal::ZERO);

        assert_eq!(update.realised_delta, dec!(20));
        assert!(update.closed);
        assert_eq!(position.quantity, Decimal::ZERO);
        assert_eq!(position.pnl_realised, dec!(20));
        assert_eq!(position.pnl_unrealised, Decimal::ZERO);
    }

    #[test]
    fn test_partial_reduction_keeps_entry() {
        let mut position = Position::new(SymbolId(0));
        position.apply_fill(Side::Buy, dec!(100), dec!(2), Decimal::ZERO);

        let update = position.apply_fill(Side::Sell, dec!(110), dec!(1), Decimal::ZERO);

        assert_eq!(update.realised_delta, dec!(10));
        assert!(!update.closed);
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.entry_price_average, dec!(100));
    }

    #[test]
    fn test_flip_realises_and_reopens_at_fill_price() {
        let mut position = Position::new(SymbolId(0));
        position.apply_fill(Side::Buy, dec!(100), dec!(1), Decimal::ZERO);

        // Sell 3 against a long 1: realise the long, go short 2 at 120.
        let update = position.apply_fill(Side::Sell, dec!(120), dec!(3), Decimal::ZERO);

        assert_eq!(update.realised_delta, dec!(20));
        assert_eq!(position.quantity, dec!(-2));
        assert_eq!(position.entry_price_average, dec!(120));
    }

    #[test]
    fn test_short_position_pnl() {
        let mut position = Position::new(SymbolId(0));
        position.apply_fill(Side::Sell, dec!(100), dec!(2), Decimal::ZERO);

        position.refresh_unrealised(dec!(90));
        assert_eq!(position.pnl_unrealised, dec!(20), "short profits as price falls");

        let update = position.apply_fill(Side::Buy, dec!(90), dec!(2), Decimal::ZERO);
        assert_eq!(update.realised_delta, dec!(20));
        assert!(update.closed);
    }

    #[test]
    fn test_fees_reduce_realised_pnl() {
        let mut position = Position::new(SymbolId(0));

        let update = position.apply_fill(Side::Buy, dec!(100), dec!(1), dec!(0.5));
        assert_eq!(update.realised_delta, dec!(-0.5));
        assert_eq!(position.pnl_realised, dec!(-0.5));
    }
}
