//! Typed action contexts.
//!
//! Parameters an action index cannot carry arrive as one of these
//! variants. The dispatcher refuses an action whose context variant
//! does not match the decoded action's category, so a syntactically
//! invalid context never reaches a handler.

use serde::{Deserialize, Serialize};

use crate::cards::CounterKind;

/// Parameters for one action.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ActionContext {
    /// Actions whose index carries every parameter.
    #[default]
    None,

    /// A hand index for actions whose index does not carry it
    /// (madness, overload, split halves, grandeur, some mechanics).
    Hand { hand_idx: usize },

    /// A battlefield index (flip, morph, manifest, boast, exert).
    Battlefield { battlefield_idx: usize },

    /// A graveyard index (dredge, aftermath, flashback-style casts).
    Graveyard { graveyard_idx: usize },

    /// BLOCK with an explicit attacker (declaration-order index).
    Block { attacker_idx: usize },

    /// DEFEND_BATTLE: which battle, which defender.
    DefendBattle {
        battle_idx: usize,
        defender_idx: usize,
    },

    /// Graveyard/hand casts that carry extra cost components.
    AltCast {
        hand_idx: Option<usize>,
        graveyard_idx: Option<usize>,
        /// Jump-start discard.
        discard_hand_idx: Option<usize>,
        /// Escape / delve exile fodder (graveyard indices).
        exile_graveyard_idxs: Vec<usize>,
        /// Emerge sacrifice (battlefield index).
        sacrifice_battlefield_idx: Option<usize>,
    },

    /// Response actions: the card and the stack target.
    Response {
        hand_idx: usize,
        target_stack_idx: usize,
    },

    /// EQUIP / FORTIFY / RECONFIGURE / MUTATE: source and target.
    Attach {
        source_idx: usize,
        target_idx: usize,
    },

    /// COPY_PERMANENT target (battlefield index, either side:
    /// 0–19 yours, 20–39 opponent's).
    CopyPermanent { target_idx: usize },

    /// COPY_SPELL / CONSPIRE stack position (bottom-up).
    Spell { stack_idx: usize },

    /// CONSPIRE: stack position plus two untapped creatures.
    Conspire {
        stack_idx: usize,
        creature1_idx: usize,
        creature2_idx: usize,
    },

    /// FIRST_STRIKE_ORDER: explicit blocker order for one attacker
    /// (indices into its current blocker list).
    DamageOrder {
        attacker_idx: usize,
        order: Vec<usize>,
    },

    /// NINJUTSU: ninja in hand, attacker to swap out.
    Ninjutsu {
        hand_idx: usize,
        attacker_idx: usize,
    },

    /// Loyalty activations: which planeswalker.
    Loyalty { battlefield_idx: usize },

    /// PROTECT_PLANESWALKER: walker and soaking creature.
    Protect {
        planeswalker_idx: usize,
        defender_idx: usize,
    },

    /// ADD/REMOVE_COUNTER: which kind.
    Counter { kind: CounterKind },

    /// PAY_ESCALATE: how many extra modes.
    Escalate { extra_modes: u8 },
}

impl ActionContext {
    /// Convenience accessor used by handlers that accept `Hand`.
    #[must_use]
    pub fn hand_idx(&self) -> Option<usize> {
        match self {
            ActionContext::Hand { hand_idx } => Some(*hand_idx),
            ActionContext::AltCast { hand_idx, .. } => *hand_idx,
            _ => None,
        }
    }

    /// Convenience accessor for graveyard-borne casts.
    #[must_use]
    pub fn graveyard_idx(&self) -> Option<usize> {
        match self {
            ActionContext::Graveyard { graveyard_idx } => Some(*graveyard_idx),
            ActionContext::AltCast { graveyard_idx, .. } => *graveyard_idx,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(ActionContext::Hand { hand_idx: 3 }.hand_idx(), Some(3));
        assert_eq!(ActionContext::None.hand_idx(), None);

        let alt = ActionContext::AltCast {
            hand_idx: None,
            graveyard_idx: Some(2),
            discard_hand_idx: None,
            exile_graveyard_idxs: vec![],
            sacrifice_battlefield_idx: None,
        };
        assert_eq!(alt.graveyard_idx(), Some(2));
        assert_eq!(alt.hand_idx(), None);
    }

    #[test]
    fn test_serde() {
        let ctx = ActionContext::Response {
            hand_idx: 1,
            target_stack_idx: 0,
        };
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ActionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }
}
