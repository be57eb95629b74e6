use crate::{
    RiskApproved,
    breach::{RiskBreach, check_breaches},
    error::{RiskError, RiskRefused, code},
    portfolio::{FillApplied, Portfolio},
    profile::RiskProfile,
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use quantor_book::snapshot::MarketSnapshot;
use quantor_execution::{
    order::{OrderKind, id::BotId},
    trade::Fill,
};
use quantor_instrument::{Side, symbol::SymbolId};
use quantor_strategy::signal::Signal;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which price marks positions for exposure and unrealised P&L.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Default)]
pub enum MarkPolicy {
    /// The last trade print (default).
    #[default]
    LastTrade,
    /// The mid-price of the current best bid and ask.
    MidPrice,
}

/// Venue sizing constraints applied when an approved order is cut down.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SizingLimits {
    /// Minimum base-asset lot; sized quantities are floored to a multiple of it.
    pub min_lot: Decimal,
    pub tick_size: Decimal,
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            min_lot: Decimal::new(1, 8),
            tick_size: Decimal::new(1, 8),
        }
    }
}

/// An order that passed every pre-trade check, sized and rounded for the venue.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SizedOrder {
    pub bot: BotId,
    pub symbol: SymbolId,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

/// Enforces portfolio-level and per-bot invariants before any order leaves the system, and
/// updates portfolios after every fill.
///
/// The guard exclusively owns every bot portfolio. It runs as a single serialised task in the
/// orchestrator: all mutation flows through its inbox, so no locks are needed inside.
#[derive(Debug, Default)]
pub struct RiskGuard {
    mark_policy: MarkPolicy,
    portfolios: FnvHashMap<BotId, Portfolio>,
    profiles: FnvHashMap<BotId, RiskProfile>,
}

impl RiskGuard {
    pub fn new(mark_policy: MarkPolicy) -> Self {
        Self {
            mark_policy,
            ..Self::default()
        }
    }

    /// Register a bot with its risk limits and starting cash.
    pub fn register_bot(&mut self, bot: BotId, profile: RiskProfile, cash: Decimal) {
        self.portfolios.insert(bot.clone(), Portfolio::new(cash));
        self.profiles.insert(bot, profile);
    }

    /// Remove a bot, returning its final portfolio for journaling.
    pub fn remove_bot(&mut self, bot: &BotId) -> Option<Portfolio> {
        self.profiles.remove(bot);
        self.portfolios.remove(bot)
    }

    pub fn portfolio(&self, bot: &BotId) -> Option<&Portfolio> {
        self.portfolios.get(bot)
    }

    pub fn profile(&self, bot: &BotId) -> Option<&RiskProfile> {
        self.profiles.get(bot)
    }

    /// Record a new mark price for every portfolio holding the symbol.
    pub fn set_mark(&mut self, symbol: SymbolId, price: Decimal) {
        for portfolio in self.portfolios.values_mut() {
            portfolio.set_mark(symbol, price);
        }
    }

    /// Roll the trading day for every portfolio.
    pub fn roll_day(&mut self) {
        for portfolio in self.portfolios.values_mut() {
            portfolio.roll_day();
        }
    }

    /// Pre-trade gate. Checks run in declared order; the first failure wins and carries a
    /// stable reason code. On success the order is sized down by signal confidence, subject to
    /// the venue's minimum lot and tick size.
    pub fn approve(
        &self,
        signal: Signal,
        bot_running: bool,
        snapshot: &MarketSnapshot,
        limits: &SizingLimits,
        now: DateTime<Utc>,
    ) -> Result<RiskApproved<SizedOrder>, RiskRefused<Signal>> {
        if !bot_running {
            return Err(RiskRefused::new(signal, code::BOT_PAUSED, "bot is not running"));
        }
        if signal.expired(now) {
            return Err(RiskRefused::new(
                signal,
                code::RISK_SIGNAL_EXPIRED,
                "signal ttl elapsed before risk approval",
            ));
        }

        let (Some(portfolio), Some(profile)) = (
            self.portfolios.get(&signal.bot),
            self.profiles.get(&signal.bot),
        ) else {
            return Err(RiskRefused::new(
                signal,
                code::RISK_UNKNOWN_BOT,
                "bot has no registered portfolio",
            ));
        };

        let Some(price) = signal.suggested_price.or_else(|| match self.mark_policy {
            MarkPolicy::LastTrade => snapshot.last,
            MarkPolicy::MidPrice => snapshot.mid_price(),
        }) else {
            return Err(RiskRefused::new(
                signal,
                code::RISK_NO_MARK,
                "no mark price available for sizing",
            ));
        };

        let equity = portfolio.equity();
        let notional = price * signal.suggested_quantity;
        if equity <= Decimal::ZERO || notional > profile.max_position_pct * equity {
            let message = format!(
                "notional {notional} exceeds {} of equity {equity}",
                profile.max_position_pct
            );
            return Err(RiskRefused::new(signal, code::RISK_POSITION_LIMIT, message));
        }

        // Worst-case loss of the proposed order, as a signed P&L delta.
        let worst_case = if profile.stop_loss_pct > Decimal::ZERO {
            -(profile.stop_loss_pct * notional)
        } else {
            -notional
        };

        let daily_loss_limit = profile.max_daily_loss_pct * portfolio.start_of_day_equity;
        if portfolio.day_pnl - worst_case < -daily_loss_limit {
            let message = format!(
                "day pnl {} with worst case {} breaches budget {}",
                portfolio.day_pnl, worst_case, daily_loss_limit
            );
            return Err(RiskRefused::new(signal, code::RISK_DAILY_LOSS, message));
        }

        if portfolio.peak_equity > Decimal::ZERO {
            let projected_equity = equity + worst_case;
            let projected_drawdown = ((portfolio.peak_equity - projected_equity)
                / portfolio.peak_equity)
                .max(Decimal::ZERO);
            if projected_drawdown > profile.max_drawdown_pct {
                let message = format!(
                    "projected drawdown {projected_drawdown} exceeds {}",
                    profile.max_drawdown_pct
                );
                return Err(RiskRefused::new(signal, code::RISK_DRAWDOWN, message));
            }
        }

        if signal.side == Side::Buy {
            let required = quantor_book::rounding::base_to_quote_ceil(
                signal.suggested_quantity,
                price,
                8,
            );
            if portfolio.cash - required < Decimal::ZERO {
                let message = format!("cash {} cannot cover {required}", portfolio.cash);
                return Err(RiskRefused::new(signal, code::RISK_OVERDRAFT, message));
            }
        }

        let current = portfolio
            .positions
            .get(&signal.symbol)
            .map(|position| position.quantity)
            .unwrap_or(Decimal::ZERO);
        let signed = match signal.side {
            Side::Buy => signal.suggested_quantity,
            Side::Sell => -signal.suggested_quantity,
        };
        let post_value = ((current + signed) * price).abs();
        if post_value / equity > profile.concentration_cap {
            let message = format!(
                "post-trade exposure {post_value} exceeds concentration cap {}",
                profile.concentration_cap
            );
            return Err(RiskRefused::new(signal, code::RISK_CONCENTRATION, message));
        }

        // Size down by confidence, then snap to the venue's lot and tick grid.
        let sized = (signal.confidence * signal.suggested_quantity / limits.min_lot)
            .floor()
            * limits.min_lot;
        if sized < limits.min_lot {
            return Err(RiskRefused::new(
                signal,
                code::RISK_MIN_LOT,
                "confidence-sized quantity below minimum lot",
            ));
        }

        let price = signal.suggested_price.map(|suggested| {
            let strategy = match signal.side {
                Side::Buy => RoundingStrategy::ToNegativeInfinity,
                Side::Sell => RoundingStrategy::ToPositiveInfinity,
            };
            (suggested / limits.tick_size)
                .round_dp_with_strategy(0, strategy)
                * limits.tick_size
        });

        let order = SizedOrder {
            bot: signal.bot.clone(),
            symbol: signal.symbol,
            side: signal.side,
            kind: if price.is_some() {
                OrderKind::Limit
            } else {
                OrderKind::Market
            },
            price,
            quantity: sized,
        };
        info!(bot = %order.bot, side = %order.side, quantity = %order.quantity, "risk approved order");

        Ok(RiskApproved::new(order))
    }

    /// Post-fill update: atomically adjusts the bot's portfolio and verifies the accounting
    /// identity. Any failure here is an invariant violation - the caller halts all bots.
    pub fn apply_fill(&mut self, bot: &BotId, fill: &Fill) -> Result<FillApplied, RiskError> {
        let portfolio = self.portfolios.get_mut(bot).ok_or(RiskError::UnknownBot)?;
        let applied = portfolio.apply_fill(fill)?;
        portfolio.audit()?;
        Ok(applied)
    }

    /// Evaluate circuit breakers for every bot.
    pub fn breaches(&self, now: DateTime<Utc>) -> Vec<RiskBreach> {
        self.portfolios
            .iter()
            .flat_map(|(bot, portfolio)| {
                let Some(profile) = self.profiles.get(bot) else {
                    warn!(%bot, "portfolio without profile - skipping breach checks");
                    return Vec::new();
                };
                check_breaches(bot, portfolio, profile, now)
            })
            .collect()
    }
}
