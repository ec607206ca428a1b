//! Price level management for one side of the replica book

use crate::decimal::ExactDecimal;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::iter::Rev;

/// Side of the order book (Bid or Ask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy side (bids), best is the highest price
    Bid,
    /// Sell side (asks), best is the lowest price
    Ask,
}

/// One side of the book: price -> volume, strictly ascending by price
///
/// Ordering is the same for both sides; `Side` only decides which end is best
/// (asks: first entry, bids: last entry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSide {
    levels: BTreeMap<ExactDecimal, ExactDecimal>,
}

impl OrderedSide {
    /// Create a new empty side
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a level; zero volume removes it
    ///
    /// Prices for one pair arrive with a fixed precision, so an existing key
    /// keeps its original spelling.
    #[inline]
    pub fn apply(&mut self, price: ExactDecimal, volume: ExactDecimal) {
        if volume.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, volume);
        }
    }

    /// Volume resting at `price`
    #[inline]
    pub fn get(&self, price: &ExactDecimal) -> Option<&ExactDecimal> {
        self.levels.get(price)
    }

    /// Is there a level at `price`
    #[inline]
    pub fn contains(&self, price: &ExactDecimal) -> bool {
        self.levels.contains_key(price)
    }

    /// Number of levels
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no levels rest on this side
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels in ascending price order
    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, ExactDecimal, ExactDecimal> {
        self.levels.iter()
    }

    /// Levels from best to worst for the given side
    #[inline]
    pub fn iter_best(&self, side: Side) -> BestLevels<'_> {
        match side {
            Side::Ask => BestLevels::Ascending(self.levels.iter()),
            Side::Bid => BestLevels::Descending(self.levels.iter().rev()),
        }
    }

    /// Best level for the given side
    #[inline]
    pub fn best(&self, side: Side) -> Option<(&ExactDecimal, &ExactDecimal)> {
        match side {
            Side::Ask => self.levels.first_key_value(),
            Side::Bid => self.levels.last_key_value(),
        }
    }

    /// Drop worst levels until at most `depth` remain
    ///
    /// Worst is the highest price for asks and the lowest price for bids.
    pub fn trim(&mut self, depth: usize, side: Side) {
        while self.levels.len() > depth {
            match side {
                Side::Ask => self.levels.pop_last(),
                Side::Bid => self.levels.pop_first(),
            };
        }
    }
}

/// Best-first walk over one side, see [`OrderedSide::iter_best`]
#[derive(Debug, Clone)]
pub enum BestLevels<'a> {
    /// Lowest price first (asks)
    Ascending(btree_map::Iter<'a, ExactDecimal, ExactDecimal>),
    /// Highest price first (bids)
    Descending(Rev<btree_map::Iter<'a, ExactDecimal, ExactDecimal>>),
}

impl<'a> Iterator for BestLevels<'a> {
    type Item = (&'a ExactDecimal, &'a ExactDecimal);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Ascending(iter) => iter.next(),
            Self::Descending(iter) => iter.next(),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Ascending(iter) => iter.size_hint(),
            Self::Descending(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for BestLevels<'_> {}

impl FromIterator<(ExactDecimal, ExactDecimal)> for OrderedSide {
    fn from_iter<I: IntoIterator<Item = (ExactDecimal, ExactDecimal)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a OrderedSide {
    type Item = (&'a ExactDecimal, &'a ExactDecimal);
    type IntoIter = btree_map::Iter<'a, ExactDecimal, ExactDecimal>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}
