use derive_more::Display;
use indexmap::IndexMap;
use quantor_execution::{AccountId, VenueId, order::id::BotId};
use quantor_instrument::symbol::Symbol;
use quantor_risk::profile::RiskProfile;
use quantor_strategy::StrategyKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One bot = one strategy instance + one capital allocation, executing on one venue account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotConfig {
    pub id: BotId,
    /// The authenticated principal owning this bot. Authentication itself is external.
    pub principal: SmolStr,
    pub strategy: StrategyKind,
    pub strategy_params: IndexMap<SmolStr, Decimal>,
    pub symbols: Vec<Symbol>,
    /// Starting cash allocated to the bot, in quote terms.
    pub allocation_ceiling: Decimal,
    pub risk_profile: RiskProfile,
    pub venue: VenueId,
    pub account: AccountId,
    /// Evaluation cadence override in seconds; the strategy kind's default applies when absent.
    #[serde(default)]
    pub cadence_secs: Option<u64>,
}

/// Bot lifecycle states.
///
/// `Idle → Running → {Paused, Erroring, Stopped}`; `Paused`/`Erroring` resume to `Running`;
/// `Stopped` is terminal.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum BotState {
    Idle,
    Running,
    Paused,
    Erroring,
    Stopped,
}

impl BotState {
    /// Whether the state machine permits `self → to`.
    pub fn can_transition(&self, to: BotState) -> bool {
        use BotState::*;
        match (self, to) {
            // Any non-terminal state can be stopped.
            (Idle | Running | Paused | Erroring, Stopped) => true,
            (Idle, Running) => true,
            (Running, Paused) => true,
            (Running, Erroring) => true,
            (Paused | Erroring, Running) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        struct TestCase {
            from: BotState,
            to: BotState,
            expected: bool,
        }

        use BotState::*;
        let tests = vec![
            TestCase { from: Idle, to: Running, expected: true },
            TestCase { from: Idle, to: Paused, expected: false },
            TestCase { from: Running, to: Paused, expected: true },
            TestCase { from: Running, to: Erroring, expected: true },
            TestCase { from: Paused, to: Running, expected: true },
            TestCase { from: Erroring, to: Running, expected: true },
            TestCase { from: Paused, to: Erroring, expected: false },
            TestCase { from: Running, to: Stopped, expected: true },
            TestCase { from: Erroring, to: Stopped, expected: true },
            TestCase { from: Stopped, to: Running, expected: false },
            TestCase { from: Stopped, to: Stopped, expected: false },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(
                test.from.can_transition(test.to),
                test.expected,
                "TC{index}: {} -> {}",
                test.from,
                test.to
            );
        }
    }
}
