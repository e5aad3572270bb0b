//! Colours, mana pools, and structured mana costs.
//!
//! The core never parses mana-cost strings; the card database hands it
//! structured `ManaCost` values and the `ManaSystem` contract decides how
//! to pay them. What lives here is the arithmetic both sides agree on:
//! six pool buckets (WUBRG + colourless) and a cost with coloured pips, a
//! generic component, and an optional X.

use serde::{Deserialize, Serialize};

/// The five colours of mana.
///
/// Colourless is not a colour; it only appears as a pool bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Blue,
    Black,
    Red,
    Green,
}

impl Color {
    /// All five colours in WUBRG order.
    pub const ALL: [Color; 5] = [
        Color::White,
        Color::Blue,
        Color::Black,
        Color::Red,
        Color::Green,
    ];

    /// Colour for a WUBRG index (0–4), `None` otherwise.
    #[must_use]
    pub fn from_wubrg_index(i: usize) -> Option<Color> {
        Color::ALL.get(i).copied()
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            Color::White => 'W',
            Color::Blue => 'U',
            Color::Black => 'B',
            Color::Red => 'R',
            Color::Green => 'G',
        };
        write!(f, "{c}")
    }
}

/// A player's mana pool: six buckets, emptied at step boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManaPool {
    pub white: u8,
    pub blue: u8,
    pub black: u8,
    pub red: u8,
    pub green: u8,
    pub colorless: u8,
}

impl ManaPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total mana across all buckets.
    #[must_use]
    pub fn total(&self) -> u32 {
        [
            self.white,
            self.blue,
            self.black,
            self.red,
            self.green,
            self.colorless,
        ]
        .iter()
        .map(|&n| u32::from(n))
        .sum()
    }

    /// Amount in a colour's bucket.
    #[must_use]
    pub fn of(&self, color: Color) -> u8 {
        match color {
            Color::White => self.white,
            Color::Blue => self.blue,
            Color::Black => self.black,
            Color::Red => self.red,
            Color::Green => self.green,
        }
    }

    /// Add one mana of a colour.
    pub fn add(&mut self, color: Color) {
        *self.bucket_mut(color) = self.of(color).saturating_add(1);
    }

    /// Add one colourless mana.
    pub fn add_colorless(&mut self) {
        self.colorless = self.colorless.saturating_add(1);
    }

    /// Remove `n` mana from a colour's bucket. Returns false if short.
    pub fn remove(&mut self, color: Color, n: u8) -> bool {
        let bucket = self.bucket_mut(color);
        if *bucket < n {
            return false;
        }
        *bucket -= n;
        true
    }

    /// Empty every bucket. Called at step/phase boundaries.
    pub fn empty(&mut self) {
        *self = Self::default();
    }

    /// True if every bucket is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn bucket_mut(&mut self, color: Color) -> &mut u8 {
        match color {
            Color::White => &mut self.white,
            Color::Blue => &mut self.blue,
            Color::Black => &mut self.black,
            Color::Red => &mut self.red,
            Color::Green => &mut self.green,
        }
    }
}

/// A structured mana cost: coloured pips, a generic component, optional X.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManaCost {
    pub generic: u8,
    pub white: u8,
    pub blue: u8,
    pub black: u8,
    pub red: u8,
    pub green: u8,
    /// Whether the cost contains {X}. The chosen value is supplied at
    /// payment time, not stored here.
    pub has_x: bool,
}

impl ManaCost {
    /// A free cost.
    #[must_use]
    pub const fn free() -> Self {
        Self {
            generic: 0,
            white: 0,
            blue: 0,
            black: 0,
            red: 0,
            green: 0,
            has_x: false,
        }
    }

    /// Cost of `n` generic mana.
    #[must_use]
    pub const fn generic(n: u8) -> Self {
        let mut c = Self::free();
        c.generic = n;
        c
    }

    /// Add coloured pips.
    #[must_use]
    pub const fn with_pips(mut self, color: Color, n: u8) -> Self {
        match color {
            Color::White => self.white += n,
            Color::Blue => self.blue += n,
            Color::Black => self.black += n,
            Color::Red => self.red += n,
            Color::Green => self.green += n,
        }
        self
    }

    /// Mark the cost as containing {X}.
    #[must_use]
    pub const fn with_x(mut self) -> Self {
        self.has_x = true;
        self
    }

    /// Coloured pips of a given colour.
    #[must_use]
    pub fn pips(&self, color: Color) -> u8 {
        match color {
            Color::White => self.white,
            Color::Blue => self.blue,
            Color::Black => self.black,
            Color::Red => self.red,
            Color::Green => self.green,
        }
    }

    /// Converted cost, with X counted as zero.
    #[must_use]
    pub fn cmc(&self) -> u32 {
        u32::from(self.generic)
            + Color::ALL
                .iter()
                .map(|&c| u32::from(self.pips(c)))
                .sum::<u32>()
    }

    /// Cost with `n` subtracted from the generic component (delve, emerge).
    #[must_use]
    pub fn reduced_generic(mut self, n: u8) -> Self {
        self.generic = self.generic.saturating_sub(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_add_remove() {
        let mut pool = ManaPool::new();
        pool.add(Color::Red);
        pool.add(Color::Red);
        pool.add_colorless();

        assert_eq!(pool.total(), 3);
        assert_eq!(pool.of(Color::Red), 2);

        assert!(pool.remove(Color::Red, 2));
        assert!(!pool.remove(Color::Red, 1));
        assert_eq!(pool.total(), 1);
    }

    #[test]
    fn test_pool_empty() {
        let mut pool = ManaPool::new();
        pool.add(Color::Green);
        pool.add_colorless();
        pool.empty();

        assert!(pool.is_empty());
    }

    #[test]
    fn test_cost_cmc() {
        let cost = ManaCost::generic(2).with_pips(Color::Blue, 1);
        assert_eq!(cost.cmc(), 3);

        let x_cost = ManaCost::generic(0).with_pips(Color::Red, 1).with_x();
        assert_eq!(x_cost.cmc(), 1);
    }

    #[test]
    fn test_cost_reduced_generic() {
        let cost = ManaCost::generic(6).with_pips(Color::Black, 1);
        let delved = cost.reduced_generic(4);

        assert_eq!(delved.generic, 2);
        assert_eq!(delved.pips(Color::Black), 1);

        // Never reduces below zero and never touches pips.
        let floored = cost.reduced_generic(10);
        assert_eq!(floored.generic, 0);
        assert_eq!(floored.pips(Color::Black), 1);
    }

    #[test]
    fn test_wubrg_index() {
        assert_eq!(Color::from_wubrg_index(0), Some(Color::White));
        assert_eq!(Color::from_wubrg_index(4), Some(Color::Green));
        assert_eq!(Color::from_wubrg_index(5), None);
    }
}
