use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Historical-simulation value-at-risk over a rolling window of period returns.
///
/// Each bot [`Portfolio`](crate::portfolio::Portfolio) holds one and feeds it an equity
/// observation per applied fill, so VaR tracks the portfolio continuously as trades mutate
/// positions, alongside exposure and drawdown. VaR at confidence `c` is the loss quantile of
/// the recorded returns, expressed as a positive fraction of equity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueAtRisk {
    window: usize,
    last_equity: Option<Decimal>,
    returns: VecDeque<Decimal>,
}

impl ValueAtRisk {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            last_equity: None,
            returns: VecDeque::new(),
        }
    }

    /// Record the equity observed at the end of a period.
    pub fn observe(&mut self, equity: Decimal) {
        if let Some(last) = self.last_equity.replace(equity)
            && last > Decimal::ZERO
        {
            self.returns.push_back((equity - last) / last);
            if self.returns.len() > self.window {
                self.returns.pop_front();
            }
        }
    }

    /// Whether a full window of returns has been observed.
    pub fn is_warm(&self) -> bool {
        self.returns.len() >= self.window
    }

    /// VaR at the given confidence (eg/ `0.95`), as a positive loss fraction.
    ///
    /// `None` until at least one return has been recorded. A window of non-negative returns
    /// yields zero.
    pub fn value_at_risk(&self, confidence: Decimal) -> Option<Decimal> {
        if self.returns.is_empty() {
            return None;
        }

        let mut sorted = self.returns.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();

        // Index of the loss quantile: with confidence 0.95 over 100 returns, the 5th worst.
        let tail = Decimal::ONE - confidence.clamp(Decimal::ZERO, Decimal::ONE);
        let position = (tail * Decimal::from(sorted.len() as u64)).floor();
        let index = position.to_usize().unwrap_or(0).min(sorted.len() - 1);

        Some((-sorted[index]).max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_var_picks_the_loss_quantile() {
        let mut var = ValueAtRisk::new(4);
        // Equity path producing returns of -10%, +10%, -5%, +2%.
        for equity in [dec!(1000), dec!(900), dec!(990), dec!(940.5), dec!(959.31)] {
            var.observe(equity);
        }
        assert!(var.is_warm());

        // 95% over 4 returns: index 0 - the worst return.
        assert_eq!(var.value_at_risk(dec!(0.95)), Some(dec!(0.1)));
        // 50%: index 2 of sorted [-0.1, -0.05, 0.02, 0.1] is a gain - zero loss.
        assert_eq!(var.value_at_risk(dec!(0.5)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_var_is_zero_for_all_gains() {
        let mut var = ValueAtRisk::new(3);
        for equity in [dec!(100), dec!(101), dec!(102), dec!(103)] {
            var.observe(equity);
        }
        assert_eq!(var.value_at_risk(dec!(0.99)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_var_requires_observations() {
        let mut var = ValueAtRisk::new(10);
        assert_eq!(var.value_at_risk(dec!(0.95)), None);
        var.observe(dec!(100));
        // One observation produces no return yet.
        assert_eq!(var.value_at_risk(dec!(0.95)), None);
        var.observe(dec!(90));
        assert_eq!(var.value_at_risk(dec!(0.95)), Some(dec!(0.1)));
    }

    #[test]
    fn test_window_rolls() {
        let mut var = ValueAtRisk::new(2);
        for equity in [dec!(100), dec!(50), dec!(55), dec!(60.5)] {
            var.observe(equity);
        }
        // The -50% return rolled out of the window; the worst remaining is +10%.
        assert_eq!(var.value_at_risk(dec!(0.99)), Some(Decimal::ZERO));
    }
}
