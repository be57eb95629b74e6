use crate::{
    StrategyKind, arbitrage::ArbitrageState, dca::DcaState, grid::GridState,
    mean_reversion::MeanReversionState, momentum::MomentumState, scalping::ScalpingState,
    swing::SwingState,
};

/// Persistent per-bot strategy memory, passed into every `on_tick` and replaced by the returned
/// state.
///
/// The variant must match the strategy kind evaluating it; a mismatch is an inconsistent state
/// and the supervisor transitions the bot to `Erroring`.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyState {
    Dca(DcaState),
    Grid(GridState),
    Momentum(MomentumState),
    MeanReversion(MeanReversionState),
    Arbitrage(ArbitrageState),
    Scalping(ScalpingState),
    Swing(SwingState),
}

impl StrategyState {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Dca(_) => StrategyKind::Dca,
            Self::Grid(_) => StrategyKind::Grid,
            Self::Momentum(_) => StrategyKind::Momentum,
            Self::MeanReversion(_) => StrategyKind::MeanReversion,
            Self::Arbitrage(_) => StrategyKind::Arbitrage,
            Self::Scalping(_) => StrategyKind::Scalping,
            Self::Swing(_) => StrategyKind::Swing,
        }
    }
}
