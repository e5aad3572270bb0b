//! Game events and pending triggered abilities.
//!
//! The core fires a `GameEvent` after each observable state change and
//! asks the `AbilityHandler` which triggered abilities it raises. The
//! answers queue as `PendingTrigger`s until the post-action loop drains
//! them onto the stack in APNAP order.

use serde::{Deserialize, Serialize};

use crate::cards::CardId;
use crate::core::{CardHandle, Phase, PlayerId, Zone};

/// Something observable that happened in the game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    ZoneChange {
        card: CardHandle,
        card_id: CardId,
        from: Zone,
        to: Zone,
        controller: PlayerId,
    },
    EntersBattlefield {
        card: CardHandle,
        card_id: CardId,
        controller: PlayerId,
    },
    /// Battlefield to graveyard specifically.
    Dies {
        card: CardHandle,
        card_id: CardId,
        controller: PlayerId,
    },
    SpellCast {
        card_id: CardId,
        controller: PlayerId,
    },
    Attacks {
        card: CardHandle,
        controller: PlayerId,
    },
    Blocks {
        blocker: CardHandle,
        attacker: CardHandle,
        controller: PlayerId,
    },
    DamageToPlayer {
        player: PlayerId,
        amount: i32,
    },
    DamageToPermanent {
        card: CardHandle,
        amount: i32,
    },
    LifeGained {
        player: PlayerId,
        amount: i32,
    },
    CardDrawn {
        player: PlayerId,
    },
    Discarded {
        card_id: CardId,
        player: PlayerId,
    },
    Sacrificed {
        card_id: CardId,
        controller: PlayerId,
    },
    PhaseBegins {
        phase: Phase,
        active: PlayerId,
    },
    TurnBegins {
        player: PlayerId,
        turn: u32,
    },
    EndOfCombat,
}

/// A triggered ability raised by an event, waiting to go on the stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTrigger {
    /// The permanent or card whose ability triggered.
    pub source: CardHandle,
    pub controller: PlayerId,
    /// Opaque id the ability interpreter uses to identify the trigger.
    pub trigger_id: u16,
    /// The event that raised it, kept for resolution context.
    pub event: GameEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde() {
        let event = GameEvent::DamageToPlayer {
            player: PlayerId::P2,
            amount: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: GameEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
