use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Declared per-bot risk limits, all expressed as fractions of equity (`0.1` = 10%).
///
/// Immutable after bot registration; changing limits registers a new version.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RiskProfile {
    /// Maximum single-order notional as a fraction of equity.
    pub max_position_pct: Decimal,
    /// Maximum daily loss as a fraction of start-of-day equity.
    pub max_daily_loss_pct: Decimal,
    /// Worst-case loss assumed per order, as a fraction of its notional.
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    /// Maximum tolerated drawdown from peak equity.
    pub max_drawdown_pct: Decimal,
    /// Maximum per-symbol exposure as a fraction of equity after the trade.
    pub concentration_cap: Decimal,
    /// Maximum gross exposure as a fraction of equity (circuit breaker threshold).
    pub max_exposure_pct: Decimal,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            max_position_pct: Decimal::new(25, 2),
            max_daily_loss_pct: Decimal::new(5, 2),
            stop_loss_pct: Decimal::new(10, 2),
            take_profit_pct: Decimal::new(20, 2),
            max_drawdown_pct: Decimal::new(20, 2),
            concentration_cap: Decimal::new(50, 2),
            max_exposure_pct: Decimal::ONE,
        }
    }
}
