use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::fmt::{Display, Formatter};

/// Immutable market identifier containing a base and quote asset.
///
/// eg/ Symbol { base: "btc", quote: "usdt" }
///
/// Symbols are compared by value. Hot paths should prefer the stable numeric [`SymbolId`]
/// assigned by the [`SymbolRegistry`](crate::registry::SymbolRegistry).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Symbol {
    pub base: SmolStr,
    pub quote: SmolStr,
}

impl Symbol {
    pub fn new<S>(base: S, quote: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self {
            base: lowercase(base.into()),
            quote: lowercase(quote.into()),
        }
    }

    /// Canonical `base/quote` market name.
    ///
    /// eg/ "btc/usdt"
    pub fn name(&self) -> SmolStr {
        format_smolstr!("{}/{}", self.base, self.quote)
    }
}

fn lowercase(input: SmolStr) -> SmolStr {
    if input.chars().all(char::is_lowercase) {
        input
    } else {
        SmolStr::new(input.to_lowercase())
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Stable numeric [`Symbol`] identifier assigned by the
/// [`SymbolRegistry`](crate::registry::SymbolRegistry).
///
/// Cheap to copy and compare, so used in place of [`Symbol`] on hot paths.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    Display,
    From,
    Constructor,
)]
#[display("SymbolId({_0})")]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_name_is_lowercase_base_quote() {
        struct TestCase {
            input: Symbol,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: already lowercase
                input: Symbol::new("btc", "usdt"),
                expected: "btc/usdt",
            },
            TestCase {
                // TC1: mixed case is canonicalised
                input: Symbol::new("ETH", "Usdt"),
                expected: "eth/usdt",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.name(), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_symbol_compares_by_value() {
        assert_eq!(Symbol::new("btc", "usdt"), Symbol::new("BTC", "USDT"));
        assert_ne!(Symbol::new("btc", "usdt"), Symbol::new("btc", "usdc"));
    }

    #[test]
    fn test_symbol_serde_round_trip() {
        let symbol = Symbol::new("sol", "usdt");
        let json = serde_json::to_string(&symbol).unwrap();
        let parsed: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, parsed);
    }
}
