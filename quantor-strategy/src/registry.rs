use crate::{
    StrategyKind,
    arbitrage::Arbitrage,
    dca::Dca,
    error::StrategyError,
    grid::Grid,
    mean_reversion::MeanReversion,
    momentum::Momentum,
    scalping::Scalping,
    strategy::Strategy,
    swing::Swing,
};
use indexmap::IndexMap;
use quantor_execution::order::id::BotId;
use quantor_instrument::symbol::SymbolId;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::time::Duration;

/// Everything needed to construct a strategy instance for one bot.
#[derive(Debug, Clone)]
pub struct StrategySpec<'a> {
    pub bot: BotId,
    pub symbols: &'a [SymbolId],
    pub params: &'a IndexMap<SmolStr, Decimal>,
    pub signal_ttl: Duration,
}

impl StrategySpec<'_> {
    fn primary_symbol(&self) -> Result<SymbolId, StrategyError> {
        self.symbols
            .first()
            .copied()
            .ok_or_else(|| StrategyError::Evaluation {
                message: "strategy requires at least one symbol".to_string(),
            })
    }

    fn require(&self, name: &'static str) -> Result<Decimal, StrategyError> {
        self.params
            .get(name)
            .copied()
            .ok_or(StrategyError::MissingParam {
                name: SmolStr::new_static(name),
            })
    }

    fn optional(&self, name: &'static str, default: Decimal) -> Decimal {
        self.params.get(name).copied().unwrap_or(default)
    }

    fn positive(&self, name: &'static str) -> Result<Decimal, StrategyError> {
        let value = self.require(name)?;
        if value <= Decimal::ZERO {
            return Err(StrategyError::InvalidParam {
                name: SmolStr::new_static(name),
                value,
            });
        }
        Ok(value)
    }

    fn as_usize(name: &'static str, value: Decimal) -> Result<usize, StrategyError> {
        value
            .to_usize()
            .filter(|count| *count > 0)
            .ok_or(StrategyError::InvalidParam {
                name: SmolStr::new_static(name),
                value,
            })
    }

    fn as_duration(name: &'static str, value: Decimal) -> Result<Duration, StrategyError> {
        value
            .to_u64()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(StrategyError::InvalidParam {
                name: SmolStr::new_static(name),
                value,
            })
    }
}

/// Builder function constructing one strategy kind from a [`StrategySpec`].
pub type StrategyBuilder = fn(&StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError>;

/// Registry of strategy implementations keyed by [`StrategyKind`].
///
/// Composition over subtype polymorphism: callers hold the narrow [`Strategy`] capability and
/// never know the concrete type.
#[derive(Debug)]
pub struct StrategyRegistry {
    builders: HashMap<StrategyKind, StrategyBuilder>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self {
            builders: HashMap::new(),
        };
        registry.register(StrategyKind::Dca, build_dca);
        registry.register(StrategyKind::Grid, build_grid);
        registry.register(StrategyKind::Momentum, build_momentum);
        registry.register(StrategyKind::MeanReversion, build_mean_reversion);
        registry.register(StrategyKind::Arbitrage, build_arbitrage);
        registry.register(StrategyKind::Scalping, build_scalping);
        registry.register(StrategyKind::Swing, build_swing);
        registry
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: StrategyKind, builder: StrategyBuilder) {
        self.builders.insert(kind, builder);
    }

    pub fn build(
        &self,
        kind: StrategyKind,
        spec: &StrategySpec<'_>,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let builder = self
            .builders
            .get(&kind)
            .ok_or_else(|| StrategyError::Evaluation {
                message: format!("no builder registered for strategy kind {kind}"),
            })?;
        builder(spec)
    }
}

fn build_dca(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Dca {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        investment: spec.positive("investment")?,
        interval: StrategySpec::as_duration("interval_secs", spec.require("interval_secs")?)?,
        max_deviation: spec.optional("max_deviation", Decimal::new(5, 2)),
        quantity_scale: 8,
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_grid(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    let lower = spec.positive("lower")?;
    let upper = spec.positive("upper")?;
    if upper <= lower {
        return Err(StrategyError::InvalidParam {
            name: SmolStr::new_static("upper"),
            value: upper,
        });
    }

    Ok(Box::new(Grid {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        lower,
        upper,
        levels: StrategySpec::as_usize("levels", spec.require("levels")?)?,
        quantity: spec.positive("quantity")?,
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_momentum(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Momentum {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        quantity: spec.positive("quantity")?,
        rsi_period: StrategySpec::as_usize(
            "rsi_period",
            spec.optional("rsi_period", Decimal::from(14)),
        )?,
        volume_period: StrategySpec::as_usize(
            "volume_period",
            spec.optional("volume_period", Decimal::from(20)),
        )?,
        volume_ratio: spec.optional("volume_ratio", Decimal::new(15, 1)),
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_mean_reversion(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(MeanReversion {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        cap: spec.positive("cap")?,
        period: StrategySpec::as_usize("period", spec.optional("period", Decimal::from(20)))?,
        band_width: spec.optional("band_width", Decimal::TWO),
        quantity_scale: 8,
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_arbitrage(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    if spec.symbols.len() < 2 {
        return Err(StrategyError::Evaluation {
            message: "arbitrage requires at least two venue legs".to_string(),
        });
    }

    Ok(Box::new(Arbitrage {
        bot: spec.bot.clone(),
        legs: spec.symbols.to_vec(),
        quantity: spec.positive("quantity")?,
        min_edge_bps: spec.optional("min_edge_bps", Decimal::from(5)),
        fee_bps: spec.optional("fee_bps", Decimal::from(10)),
        slippage_bps: spec.optional("slippage_bps", Decimal::from(5)),
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_scalping(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Scalping {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        quantity: spec.positive("quantity")?,
        max_spread: spec.positive("max_spread")?,
        max_hold: StrategySpec::as_duration(
            "max_hold_secs",
            spec.optional("max_hold_secs", Decimal::from(300)),
        )?,
        take_profit_bps: spec.optional("take_profit_bps", Decimal::from(10)),
        signal_ttl: spec.signal_ttl,
    }))
}

fn build_swing(spec: &StrategySpec<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Swing {
        bot: spec.bot.clone(),
        symbol: spec.primary_symbol()?,
        quantity: spec.positive("quantity")?,
        bar_interval: StrategySpec::as_duration(
            "bar_secs",
            spec.optional("bar_secs", Decimal::from(14_400)),
        )?,
        fast_ma: StrategySpec::as_usize("fast_ma", spec.optional("fast_ma", Decimal::from(20)))?,
        slow_ma: StrategySpec::as_usize("slow_ma", spec.optional("slow_ma", Decimal::from(50)))?,
        signal_ttl: spec.signal_ttl,
    }))
}
