//! Per-player game state: zones, life, mana, combat bookkeeping.

use im::HashSet as ImHashSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::{CardHandle, ManaPool, Zone};

/// Everything one player owns.
///
/// Zone vectors hold handles into the game's card store. `library` and
/// `graveyard` are ordered with index 0 on top; `hand`, `battlefield`,
/// and `exile` keep insertion order so action indices stay stable
/// across a decision point.
///
/// The tapped and summoning-sick sets use `im` sets for cheap clones;
/// membership is by current handle, so a zone change (which reissues
/// the handle) drops a permanent out of them automatically; the sets
/// are still swept on moves to keep them small.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerState {
    pub library: Vec<CardHandle>,
    pub hand: Vec<CardHandle>,
    pub battlefield: Vec<CardHandle>,
    pub graveyard: Vec<CardHandle>,
    pub exile: Vec<CardHandle>,

    pub life: i32,
    pub pool: ManaPool,

    /// A land has been played this turn.
    pub land_played: bool,
    pub tapped: ImHashSet<CardHandle>,
    /// Permanents that entered the battlefield this turn.
    pub entered_this_turn: ImHashSet<CardHandle>,
    /// Exerted attackers skip the next untap.
    pub skip_untap: ImHashSet<CardHandle>,

    /// Attachment -> host (equipment, auras, fortifications).
    pub attachments: FxHashMap<CardHandle, CardHandle>,
    /// Host -> card ids merged beneath it (mutate).
    pub merged: FxHashMap<CardHandle, Vec<crate::cards::CardId>>,
    /// Planeswalkers whose loyalty ability was activated this turn.
    pub activated_this_turn: ImHashSet<CardHandle>,
    /// Creatures that attacked this turn (boast).
    pub attacked_this_turn: ImHashSet<CardHandle>,
    /// Goaded creatures and the turn the goad expires after.
    pub goaded: FxHashMap<CardHandle, u32>,

    pub mulligans: u8,
    pub lost_game: bool,
    pub game_draw: bool,
    /// Attempted to draw from an empty library.
    pub drew_from_empty: bool,
}

impl PlayerState {
    #[must_use]
    pub fn new(starting_life: i32) -> Self {
        Self {
            library: Vec::new(),
            hand: Vec::new(),
            battlefield: Vec::new(),
            graveyard: Vec::new(),
            exile: Vec::new(),
            life: starting_life,
            pool: ManaPool::new(),
            land_played: false,
            tapped: ImHashSet::new(),
            entered_this_turn: ImHashSet::new(),
            skip_untap: ImHashSet::new(),
            attachments: FxHashMap::default(),
            merged: FxHashMap::default(),
            activated_this_turn: ImHashSet::new(),
            attacked_this_turn: ImHashSet::new(),
            goaded: FxHashMap::default(),
            mulligans: 0,
            lost_game: false,
            game_draw: false,
            drew_from_empty: false,
        }
    }

    /// The zone vector for a zone. Stack cards are tracked by the stack
    /// engine, not here.
    #[must_use]
    pub fn zone(&self, zone: Zone) -> &[CardHandle] {
        match zone {
            Zone::Library => &self.library,
            Zone::Hand => &self.hand,
            Zone::Battlefield => &self.battlefield,
            Zone::Graveyard => &self.graveyard,
            Zone::Exile => &self.exile,
            Zone::Stack => &[],
        }
    }

    pub(crate) fn zone_mut(&mut self, zone: Zone) -> Option<&mut Vec<CardHandle>> {
        match zone {
            Zone::Library => Some(&mut self.library),
            Zone::Hand => Some(&mut self.hand),
            Zone::Battlefield => Some(&mut self.battlefield),
            Zone::Graveyard => Some(&mut self.graveyard),
            Zone::Exile => Some(&mut self.exile),
            Zone::Stack => None,
        }
    }

    #[must_use]
    pub fn is_tapped(&self, card: CardHandle) -> bool {
        self.tapped.contains(&card)
    }

    pub fn tap(&mut self, card: CardHandle) {
        self.tapped.insert(card);
    }

    pub fn untap(&mut self, card: CardHandle) {
        self.tapped.remove(&card);
    }

    /// Entered the battlefield this turn (summoning sickness).
    #[must_use]
    pub fn is_summoning_sick(&self, card: CardHandle) -> bool {
        self.entered_this_turn.contains(&card)
    }

    /// Drop every piece of per-permanent bookkeeping for a handle that
    /// is leaving the battlefield.
    pub(crate) fn forget_permanent(&mut self, card: CardHandle) {
        self.tapped.remove(&card);
        self.entered_this_turn.remove(&card);
        self.skip_untap.remove(&card);
        self.attachments.remove(&card);
        self.merged.remove(&card);
        self.activated_this_turn.remove(&card);
        self.attacked_this_turn.remove(&card);
        self.goaded.remove(&card);
    }

    /// Per-turn state reset at the start of this player's turn.
    pub(crate) fn begin_turn(&mut self) {
        self.land_played = false;
        self.entered_this_turn = ImHashSet::new();
        self.activated_this_turn = ImHashSet::new();
        self.attacked_this_turn = ImHashSet::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_untap() {
        let mut p = PlayerState::new(20);
        let h = CardHandle::new(0, 0);

        p.tap(h);
        assert!(p.is_tapped(h));

        p.untap(h);
        assert!(!p.is_tapped(h));
    }

    #[test]
    fn test_forget_permanent() {
        let mut p = PlayerState::new(20);
        let h = CardHandle::new(3, 1);
        p.tap(h);
        p.entered_this_turn.insert(h);
        p.attachments.insert(h, CardHandle::new(4, 0));

        p.forget_permanent(h);

        assert!(!p.is_tapped(h));
        assert!(!p.is_summoning_sick(h));
        assert!(p.attachments.is_empty());
    }

    #[test]
    fn test_begin_turn_resets() {
        let mut p = PlayerState::new(20);
        p.land_played = true;
        p.entered_this_turn.insert(CardHandle::new(0, 0));

        p.begin_turn();

        assert!(!p.land_played);
        assert!(p.entered_this_turn.is_empty());
    }

    #[test]
    fn test_zone_accessor() {
        let mut p = PlayerState::new(20);
        p.hand.push(CardHandle::new(1, 0));

        assert_eq!(p.zone(Zone::Hand).len(), 1);
        assert!(p.zone(Zone::Stack).is_empty());
    }
}
