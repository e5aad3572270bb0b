//! The London mulligan flow.
//!
//! Each player draws seven, then repeatedly either keeps or mulligans
//! (shuffle back, draw seven again). On keep, a player who mulliganed
//! N times bottoms N cards of their choice, one action per card. The
//! game proper begins once both players are done.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{PlayerId, Zone};
use crate::game::Game;

/// Where a player is in the mulligan flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MulliganState {
    /// Looking at seven cards, deciding keep or mulligan.
    Deciding,
    /// Kept; must put this many cards on the bottom.
    Bottoming { remaining: u8 },
    Done,
}

impl Game {
    /// Shuffle the hand back and draw a fresh seven.
    pub fn take_mulligan(&mut self, player: PlayerId) -> bool {
        if self.mulligan[player] != MulliganState::Deciding {
            return false;
        }
        // Seven mulligans would bottom the whole hand; stop there.
        if self.players[player].mulligans >= 7 {
            return false;
        }

        let hand = std::mem::take(&mut self.players[player].hand);
        for card in hand {
            if let Some(instance) = self.store.get_mut(card) {
                instance.zone = Zone::Library;
            }
            self.players[player].library.push(card);
        }
        self.rng_shuffle_library(player);
        for _ in 0..7 {
            self.draw_silently(player);
        }

        self.players[player].mulligans += 1;
        debug!(%player, count = self.players[player].mulligans, "mulligan taken");
        true
    }

    /// Keep the current hand. Players who mulliganed start bottoming.
    pub fn keep_hand(&mut self, player: PlayerId) -> bool {
        if self.mulligan[player] != MulliganState::Deciding {
            return false;
        }
        let owed = self.players[player].mulligans;
        self.mulligan[player] = if owed > 0 {
            MulliganState::Bottoming { remaining: owed }
        } else {
            MulliganState::Done
        };
        true
    }

    /// Bottom one card by hand index during the bottoming sub-flow.
    /// Bottomed cards land on the library bottom in selection order.
    pub fn bottom_card(&mut self, player: PlayerId, hand_idx: usize) -> bool {
        let MulliganState::Bottoming { remaining } = self.mulligan[player] else {
            return false;
        };
        if remaining == 0 || hand_idx >= self.players[player].hand.len() {
            return false;
        }

        let card = self.players[player].hand.remove(hand_idx);
        if let Some(instance) = self.store.get_mut(card) {
            instance.zone = Zone::Library;
        }
        self.players[player].library.push(card);

        let remaining = remaining - 1;
        self.mulligan[player] = if remaining == 0 {
            MulliganState::Done
        } else {
            MulliganState::Bottoming { remaining }
        };
        true
    }

    /// How many cards a player still owes to the bottom.
    #[must_use]
    pub fn bottoming_remaining(&self, player: PlayerId) -> u8 {
        match self.mulligan[player] {
            MulliganState::Bottoming { remaining } => remaining,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cards::{CardData, CardId, CardRegistry, CardType, TypeLine};
    use crate::core::{PlayerId, PlayerPair};
    use crate::game::{Game, GameConfig};
    use crate::mulligan::MulliganState;

    fn game() -> Game {
        let mut registry = CardRegistry::new();
        registry.register(CardData::new(
            CardId::new(1),
            "Card",
            TypeLine::of(CardType::Sorcery),
        ));
        let deck: Vec<CardId> = (0..20).map(|_| CardId::new(1)).collect();
        Game::new(
            registry,
            GameConfig::default(),
            PlayerPair::with_value(deck),
            9,
        )
    }

    #[test]
    fn test_keep_without_mulligan_is_done() {
        let mut game = game();
        assert!(game.keep_hand(PlayerId::P1));
        assert_eq!(game.mulligan[PlayerId::P1], MulliganState::Done);
        assert_eq!(game.players[PlayerId::P1].hand.len(), 7);
    }

    #[test]
    fn test_mulligan_redraws_seven() {
        let mut game = game();
        assert!(game.take_mulligan(PlayerId::P1));

        assert_eq!(game.players[PlayerId::P1].hand.len(), 7);
        assert_eq!(game.players[PlayerId::P1].library.len(), 13);
        assert_eq!(game.players[PlayerId::P1].mulligans, 1);
    }

    #[test]
    fn test_keep_after_mulligan_requires_bottoming() {
        let mut game = game();
        game.take_mulligan(PlayerId::P1);
        game.keep_hand(PlayerId::P1);

        assert_eq!(
            game.mulligan[PlayerId::P1],
            MulliganState::Bottoming { remaining: 1 }
        );
        assert_eq!(game.bottoming_remaining(PlayerId::P1), 1);

        assert!(game.bottom_card(PlayerId::P1, 0));
        assert_eq!(game.mulligan[PlayerId::P1], MulliganState::Done);
        assert_eq!(game.players[PlayerId::P1].hand.len(), 6);
        assert_eq!(game.players[PlayerId::P1].library.len(), 14);
    }

    #[test]
    fn test_bottomed_card_goes_to_library_bottom() {
        let mut game = game();
        game.take_mulligan(PlayerId::P1);
        game.keep_hand(PlayerId::P1);

        let chosen = game.players[PlayerId::P1].hand[2];
        game.bottom_card(PlayerId::P1, 2);

        assert_eq!(*game.players[PlayerId::P1].library.last().unwrap(), chosen);
    }

    #[test]
    fn test_cannot_bottom_while_deciding() {
        let mut game = game();
        assert!(!game.bottom_card(PlayerId::P1, 0));
    }

    #[test]
    fn test_both_done_completes() {
        let mut game = game();
        game.keep_hand(PlayerId::P1);
        game.keep_hand(PlayerId::P2);
        assert!(game.mulligans_complete());
    }
}
