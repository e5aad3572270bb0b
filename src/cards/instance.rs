//! Per-instance card state.
//!
//! A `CardInstance` is one physical card in one game: which definition
//! it is, who owns and controls it, where it sits, and the mutable
//! flags and counters that do not live in the static `CardData`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, Zone};

use super::card::{CardData, CardId};

/// A kind of counter on a permanent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterKind {
    PlusOnePlusOne,
    MinusOneMinusOne,
    Loyalty,
    Defense,
    Charge,
    Time,
}

/// One card in one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardInstance {
    pub card_id: CardId,
    pub owner: PlayerId,
    pub controller: PlayerId,
    pub zone: Zone,

    // Face state.
    pub face_down: bool,
    pub morphed: bool,
    pub manifested: bool,
    /// A transforming/MDFC permanent currently showing its back face.
    pub transformed: bool,

    /// Class level (Class enchantments start at 1).
    pub level: u8,
    /// Unlocked doors on a Room (bitmask of two doors).
    pub doors_unlocked: u8,

    /// Damage marked this turn.
    pub damage: i32,
    /// Some of the marked damage came from a deathtouch source.
    pub deathtouch_damaged: bool,

    /// Token permanents cease to exist outside the battlefield.
    pub is_token: bool,
    /// Foretold in exile, castable later for the foretell cost.
    pub foretold: bool,
    /// Suspended in exile, cast for free when time counters run out.
    pub suspended: bool,

    /// Entry order stamp for the legend and world rules.
    pub timestamp: u64,

    /// Counters on this permanent.
    #[serde(default)]
    pub counters: FxHashMap<CounterKind, i32>,
}

impl CardInstance {
    #[must_use]
    pub fn new(card_id: CardId, owner: PlayerId, zone: Zone) -> Self {
        Self {
            card_id,
            owner,
            controller: owner,
            zone,
            face_down: false,
            morphed: false,
            manifested: false,
            transformed: false,
            level: 0,
            doors_unlocked: 0,
            damage: 0,
            deathtouch_damaged: false,
            is_token: false,
            foretold: false,
            suspended: false,
            timestamp: 0,
            counters: FxHashMap::default(),
        }
    }

    /// Counters of a given kind.
    #[must_use]
    pub fn counter(&self, kind: CounterKind) -> i32 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }

    /// Add counters (negative delta removes). The entry is dropped at
    /// zero so `counters` only holds kinds actually present.
    pub fn add_counters(&mut self, kind: CounterKind, delta: i32) {
        let next = self.counter(kind) + delta;
        if next <= 0 {
            self.counters.remove(&kind);
        } else {
            self.counters.insert(kind, next);
        }
    }

    /// True if any counter of any kind is present.
    #[must_use]
    pub fn has_any_counter(&self) -> bool {
        !self.counters.is_empty()
    }

    /// Effective power given the card definition.
    ///
    /// A face-down morph/manifest is a vanilla 2/2.
    #[must_use]
    pub fn power(&self, data: &CardData) -> i32 {
        if self.face_down {
            return 2;
        }
        let base = if self.transformed {
            data.back_face().and_then(|f| f.power)
        } else {
            data.power
        };
        base.unwrap_or(0) + self.counter(CounterKind::PlusOnePlusOne)
            - self.counter(CounterKind::MinusOneMinusOne)
    }

    /// Effective toughness given the card definition.
    #[must_use]
    pub fn toughness(&self, data: &CardData) -> i32 {
        if self.face_down {
            return 2;
        }
        let base = if self.transformed {
            data.back_face().and_then(|f| f.toughness)
        } else {
            data.toughness
        };
        base.unwrap_or(0) + self.counter(CounterKind::PlusOnePlusOne)
            - self.counter(CounterKind::MinusOneMinusOne)
    }

    /// Current loyalty (planeswalkers track it as counters).
    #[must_use]
    pub fn loyalty(&self) -> i32 {
        self.counter(CounterKind::Loyalty)
    }

    /// Current defense (battles track it as counters).
    #[must_use]
    pub fn defense(&self) -> i32 {
        self.counter(CounterKind::Defense)
    }

    /// Reset state that does not survive a zone change.
    ///
    /// `is_token`, `foretold`, and `suspended` are deliberately kept:
    /// the first marks the object itself, the others mark exile state
    /// that the zone change may be establishing.
    pub fn reset_on_zone_change(&mut self) {
        self.face_down = false;
        self.morphed = false;
        self.manifested = false;
        self.transformed = false;
        self.level = 0;
        self.doors_unlocked = 0;
        self.damage = 0;
        self.deathtouch_damaged = false;
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::types::{CardType, TypeLine};

    fn bear() -> CardData {
        CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature)).with_stats(2, 2)
    }

    #[test]
    fn test_counters_adjust_stats() {
        let data = bear();
        let mut card = CardInstance::new(data.id, PlayerId::P1, Zone::Battlefield);

        card.add_counters(CounterKind::PlusOnePlusOne, 2);
        assert_eq!(card.power(&data), 4);
        assert_eq!(card.toughness(&data), 4);

        card.add_counters(CounterKind::MinusOneMinusOne, 1);
        assert_eq!(card.power(&data), 3);
    }

    #[test]
    fn test_counter_entry_dropped_at_zero() {
        let mut card = CardInstance::new(CardId::new(1), PlayerId::P1, Zone::Battlefield);
        card.add_counters(CounterKind::Charge, 2);
        card.add_counters(CounterKind::Charge, -2);

        assert!(!card.has_any_counter());
        assert_eq!(card.counter(CounterKind::Charge), 0);
    }

    #[test]
    fn test_face_down_is_two_two() {
        let data = bear();
        let mut card = CardInstance::new(data.id, PlayerId::P1, Zone::Battlefield);
        card.face_down = true;
        card.morphed = true;

        assert_eq!(card.power(&data), 2);
        assert_eq!(card.toughness(&data), 2);
    }

    #[test]
    fn test_zone_change_reset() {
        let mut card = CardInstance::new(CardId::new(1), PlayerId::P1, Zone::Battlefield);
        card.damage = 3;
        card.level = 2;
        card.add_counters(CounterKind::PlusOnePlusOne, 1);

        card.reset_on_zone_change();

        assert_eq!(card.damage, 0);
        assert_eq!(card.level, 0);
        assert!(!card.has_any_counter());
    }
}
