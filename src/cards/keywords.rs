//! Keyword capabilities.
//!
//! The core treats keywords as an opaque capability set read off the
//! card database. Whether a given card actually has flying under the
//! current continuous effects is the `AbilityHandler`'s call; the set
//! here is the printed baseline the basic handler answers from.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A keyword ability or keyworded casting mechanic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    // Evergreen combat-relevant abilities.
    Deathtouch,
    Defender,
    DoubleStrike,
    FirstStrike,
    Flying,
    Haste,
    Hexproof,
    Indestructible,
    Lifelink,
    Menace,
    Reach,
    Trample,
    Vigilance,

    // Stack behaviour.
    Flash,
    SplitSecond,

    // Alternative / additional cost mechanics.
    Aftermath,
    Bestow,
    Blitz,
    Channel,
    Companion,
    Conspire,
    Dash,
    Delve,
    Disturb,
    Embalm,
    Emerge,
    Encore,
    Escalate,
    Escape,
    Eternalize,
    Evoke,
    Flashback,
    Forecast,
    Foretell,
    Grandeur,
    Impending,
    JumpStart,
    Kicker,
    Madness,
    Miracle,
    Offspring,
    Overload,
    Partner,
    Reinforce,
    Spectacle,
    Spree,
    Suspend,
    Transmute,
    Unearth,

    // Battlefield / action mechanics.
    Adapt,
    Amass,
    Boast,
    Cycling,
    Dredge,
    Exert,
    Explore,
    Fortify,
    Goad,
    Investigate,
    Learn,
    Morph,
    Mutate,
    Ninjutsu,
    Populate,
    Proliferate,
    Reconfigure,
    Venture,
}

/// The set of keywords printed on a card.
pub type KeywordSet = FxHashSet<Keyword>;

/// Build a keyword set from a slice.
#[must_use]
pub fn keyword_set(keywords: &[Keyword]) -> KeywordSet {
    keywords.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set() {
        let set = keyword_set(&[Keyword::Flying, Keyword::Vigilance]);
        assert!(set.contains(&Keyword::Flying));
        assert!(!set.contains(&Keyword::Trample));
    }

    #[test]
    fn test_serde_round_trip() {
        let set = keyword_set(&[Keyword::Ninjutsu, Keyword::Flashback]);
        let json = serde_json::to_string(&set).unwrap();
        let back: KeywordSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }
}
