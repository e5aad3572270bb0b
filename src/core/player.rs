//! Player identification and per-player data storage.
//!
//! ## PlayerId
//!
//! The core models exactly two seats, `P1` and `P2`. Multi-player games
//! are out of scope, so the id is a closed enum rather than an index.
//!
//! ## PlayerPair
//!
//! Per-player data storage backed by a two-element array with O(1)
//! access. Supports iteration and indexing by `PlayerId`.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// One of the two seats in a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerId {
    P1,
    P2,
}

impl PlayerId {
    /// The other seat.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            PlayerId::P1 => PlayerId::P2,
            PlayerId::P2 => PlayerId::P1,
        }
    }

    /// Array index for this seat (P1 = 0, P2 = 1).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            PlayerId::P1 => 0,
            PlayerId::P2 => 1,
        }
    }

    /// Both seats, P1 first.
    pub fn both() -> impl Iterator<Item = PlayerId> {
        [PlayerId::P1, PlayerId::P2].into_iter()
    }

    /// Both seats ordered APNAP relative to `active`.
    pub fn apnap(active: PlayerId) -> impl Iterator<Item = PlayerId> {
        [active, active.opponent()].into_iter()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerId::P1 => write!(f, "p1"),
            PlayerId::P2 => write!(f, "p2"),
        }
    }
}

/// Per-player data storage with O(1) access.
///
/// ## Example
///
/// ```
/// use mtg_sim::core::{PlayerId, PlayerPair};
///
/// let mut life: PlayerPair<i32> = PlayerPair::with_value(20);
/// life[PlayerId::P2] = 17;
///
/// assert_eq!(life[PlayerId::P1], 20);
/// assert_eq!(life[PlayerId::P2], 17);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerPair<T> {
    data: [T; 2],
}

impl<T> PlayerPair<T> {
    /// Create a pair with values from a factory function.
    pub fn new(factory: impl Fn(PlayerId) -> T) -> Self {
        Self {
            data: [factory(PlayerId::P1), factory(PlayerId::P2)],
        }
    }

    /// Create a pair with both entries set to the same value.
    pub fn with_value(value: T) -> Self
    where
        T: Clone,
    {
        Self::new(|_| value.clone())
    }

    /// Create a pair with default values.
    pub fn with_default() -> Self
    where
        T: Default,
    {
        Self::new(|_| T::default())
    }

    /// Get a reference to a player's data.
    #[must_use]
    pub fn get(&self, player: PlayerId) -> &T {
        &self.data[player.index()]
    }

    /// Get a mutable reference to a player's data.
    pub fn get_mut(&mut self, player: PlayerId) -> &mut T {
        &mut self.data[player.index()]
    }

    /// Iterate over (PlayerId, &T) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, &T)> {
        PlayerId::both().zip(self.data.iter())
    }
}

impl<T> Index<PlayerId> for PlayerPair<T> {
    type Output = T;

    fn index(&self, player: PlayerId) -> &Self::Output {
        self.get(player)
    }
}

impl<T> IndexMut<PlayerId> for PlayerPair<T> {
    fn index_mut(&mut self, player: PlayerId) -> &mut Self::Output {
        self.get_mut(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent() {
        assert_eq!(PlayerId::P1.opponent(), PlayerId::P2);
        assert_eq!(PlayerId::P2.opponent(), PlayerId::P1);
        assert_eq!(PlayerId::P1.opponent().opponent(), PlayerId::P1);
    }

    #[test]
    fn test_apnap_order() {
        let order: Vec<_> = PlayerId::apnap(PlayerId::P2).collect();
        assert_eq!(order, vec![PlayerId::P2, PlayerId::P1]);
    }

    #[test]
    fn test_pair_factory() {
        let pair = PlayerPair::new(|p| p.index() as i32 * 10);
        assert_eq!(pair[PlayerId::P1], 0);
        assert_eq!(pair[PlayerId::P2], 10);
    }

    #[test]
    fn test_pair_mutation() {
        let mut pair: PlayerPair<Vec<u8>> = PlayerPair::with_default();
        pair[PlayerId::P2].push(3);

        assert!(pair[PlayerId::P1].is_empty());
        assert_eq!(pair[PlayerId::P2], vec![3]);
    }

    #[test]
    fn test_pair_iter() {
        let pair = PlayerPair::with_value(7u32);
        let entries: Vec<_> = pair.iter().collect();
        assert_eq!(entries, vec![(PlayerId::P1, &7), (PlayerId::P2, &7)]);
    }

    #[test]
    fn test_serialization() {
        let pair = PlayerPair::new(|p| p.index() as i64);
        let json = serde_json::to_string(&pair).unwrap();
        let back: PlayerPair<i64> = serde_json::from_str(&json).unwrap();
        assert_eq!(pair, back);
    }
}
