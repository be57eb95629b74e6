use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate liquidity resting at one price.
#[derive(Debug, Copy, Clone, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

impl Eq for Level {}

impl Level {
    pub fn new<T>(price: T, amount: T) -> Self
    where
        T: Into<Decimal>,
    {
        Self {
            price: price.into(),
            amount: amount.into(),
        }
    }
}

impl<T> From<(T, T)> for Level
where
    T: Into<Decimal>,
{
    fn from((price, amount): (T, T)) -> Self {
        Self::new(price, amount)
    }
}

/// Unit type to tag a [`DepthSide`] as the bid side (ie/ buyers) of the book.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Display)]
pub struct Bids;

/// Unit type to tag a [`DepthSide`] as the ask side (ie/ sellers) of the book.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Display)]
pub struct Asks;

/// Sorted depth [`Level`]s for one side of the book, best price first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DepthSide<Side> {
    #[serde(skip_serializing, default)]
    pub side: Side,
    levels: Vec<Level>,
}

impl DepthSide<Bids> {
    /// Construct bid depth from the provided [`Level`]s.
    ///
    /// Note that the passed levels do not need to be pre-sorted.
    pub fn bids<Iter, L>(levels: Iter) -> Self
    where
        Iter: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        let mut levels = levels.into_iter().map(L::into).collect::<Vec<_>>();
        levels.sort_unstable_by(|a, b| a.price.cmp(&b.price).reverse());

        Self { side: Bids, levels }
    }
}

impl DepthSide<Asks> {
    /// Construct ask depth from the provided [`Level`]s.
    ///
    /// Note that the passed levels do not need to be pre-sorted.
    pub fn asks<Iter, L>(levels: Iter) -> Self
    where
        Iter: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        let mut levels = levels.into_iter().map(L::into).collect::<Vec<_>>();
        levels.sort_unstable_by(|a, b| a.price.cmp(&b.price));

        Self { side: Asks, levels }
    }
}

impl<Side> DepthSide<Side> {
    /// Best [`Level`] on this side.
    pub fn best(&self) -> Option<&Level> {
        self.levels.first()
    }

    /// All depth [`Level`]s, best price first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }
}

impl Default for DepthSide<Bids> {
    fn default() -> Self {
        Self {
            side: Bids,
            levels: vec![],
        }
    }
}

impl Default for DepthSide<Asks> {
    fn default() -> Self {
        Self {
            side: Asks,
            levels: vec![],
        }
    }
}

/// Calculate the mid-price by taking the average of the best bid and ask prices.
pub fn mid_price(best_bid_price: Decimal, best_ask_price: Decimal) -> Decimal {
    (best_bid_price + best_ask_price) / Decimal::TWO
}
