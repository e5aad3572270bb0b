//! External collaborator contracts.
//!
//! The core never parses rules text, mana strings, or card quality. It
//! talks to three narrow traits instead:
//!
//! - [`AbilityHandler`]: the rules-text interpreter. Activated
//!   abilities, keyword queries, targeting, stack-item resolution,
//!   zone-change replacements, trigger enumeration.
//! - [`ManaSystem`]: payability and payment of structured costs.
//! - [`CardEvaluator`]: scalar card quality, consulted only for
//!   default damage orders, never for legality.
//!
//! `basic` ships implementations good enough for tests and the vanilla
//! card subset.

mod basic;

pub use basic::{BasicAbilityHandler, GreedyEvaluator, PoolManaSystem, SimpleEffect, TriggerOn};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cards::{AbilityData, CardId, Keyword};
use crate::core::{CardHandle, ManaCost, PlayerId};
use crate::game::{Game, GameEvent, PendingTrigger};
use crate::stack::{StackItem, TargetRef};

/// What category of object a targeting requirement accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Creature,
    CreatureYouControl,
    CreatureOpponentControls,
    Permanent,
    Player,
    /// Creature, planeswalker, battle, or player ("any target").
    Any,
    SpellOnStack,
    AbilityOnStack,
}

/// A stack item's targeting requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRequirement {
    pub kind: TargetKind,
    pub min: u8,
    pub max: u8,
}

impl TargetRequirement {
    #[must_use]
    pub const fn exactly(kind: TargetKind, n: u8) -> Self {
        Self {
            kind,
            min: n,
            max: n,
        }
    }

    #[must_use]
    pub const fn up_to(kind: TargetKind, n: u8) -> Self {
        Self {
            kind,
            min: 0,
            max: n,
        }
    }
}

/// The response role a card can play from hand, if any. Lets the mask
/// expose the dedicated response actions without parsing rules text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseRole {
    CounterSpell,
    CounterAbility,
    PreventDamage { amount: i32 },
    RedirectDamage,
    Stifle,
}

/// Why a stack item failed to resolve.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveFailure {
    #[error("every target is gone or illegal")]
    TargetsGone,
    #[error("resolution failed: {0}")]
    Failed(String),
}

/// Why a cost could not be paid.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CostFailure {
    #[error("not enough mana")]
    InsufficientMana,
    #[error("non-mana cost component unavailable")]
    ComponentUnavailable,
}

/// The rules-text interpreter contract.
///
/// Default methods answer from the static card data, which is correct
/// for vanilla cards; richer interpreters override them.
pub trait AbilityHandler {
    /// Activated abilities of a permanent, in activation-index order.
    fn activated_abilities(&self, game: &Game, source: CardHandle) -> Vec<AbilityData> {
        game.card_data(source)
            .map(|d| d.abilities.clone())
            .unwrap_or_default()
    }

    /// Whether a card currently has a keyword.
    ///
    /// The default reads the printed keyword set, plus keywords merged
    /// in by mutate. A face-down card has no keywords.
    fn has_keyword(&self, game: &Game, card: CardHandle, keyword: Keyword) -> bool {
        let Some(instance) = game.instance(card) else {
            return false;
        };
        if instance.face_down {
            return false;
        }
        if game
            .card_data(card)
            .is_some_and(|d| d.has_keyword(keyword))
        {
            return true;
        }
        game.players[instance.controller]
            .merged
            .get(&card)
            .is_some_and(|ids| {
                ids.iter().any(|id| {
                    game.registry
                        .get(*id)
                        .is_some_and(|d| d.has_keyword(keyword))
                })
            })
    }

    /// Card-specific block restrictions beyond the evergreen keywords
    /// the combat subsystem already composes ("can't be blocked by…").
    fn can_block(&self, _game: &Game, _blocker: CardHandle, _attacker: CardHandle) -> bool {
        true
    }

    /// What a spell needs to target, if anything.
    fn targeting_requirement(&self, _game: &Game, _card_id: CardId) -> Option<TargetRequirement> {
        None
    }

    /// Enumerate currently legal targets for a requirement.
    fn valid_targets(
        &self,
        game: &Game,
        controller: PlayerId,
        req: &TargetRequirement,
    ) -> Vec<TargetRef> {
        enumerate_targets(game, controller, req)
    }

    /// Resolve a stack item's effects. Zone movement of the spell card
    /// itself is the stack engine's job, not the handler's.
    fn resolve(&self, _game: &mut Game, _item: &StackItem) -> Result<(), ResolveFailure> {
        Ok(())
    }

    /// Replacement effects on zone changes: the returned zone replaces
    /// the intended destination. Consulted before any move.
    fn replacement_zone(
        &self,
        _game: &Game,
        _card: CardHandle,
        _from: crate::core::Zone,
        _to: crate::core::Zone,
    ) -> Option<crate::core::Zone> {
        None
    }

    /// Triggered abilities raised by an event.
    fn triggers_for(&self, _game: &Game, _event: &GameEvent) -> Vec<PendingTrigger> {
        Vec::new()
    }

    /// Whether a card is a dedicated response (counter, prevention,
    /// redirect, stifle) for the response action block.
    fn response_role(&self, _game: &Game, _card_id: CardId) -> Option<ResponseRole> {
        None
    }
}

/// The mana payment contract.
///
/// `x` is the chosen X value (0 when the cost has no X). Payability
/// considers floating mana plus untapped sources; payment drains the
/// pool first and auto-taps sources for the remainder.
pub trait ManaSystem {
    fn can_pay(&self, game: &Game, player: PlayerId, cost: &ManaCost, x: u32) -> bool;

    fn pay(
        &self,
        game: &mut Game,
        player: PlayerId,
        cost: &ManaCost,
        x: u32,
    ) -> Result<(), CostFailure>;
}

/// Card quality heuristic. Never consulted for legality.
pub trait CardEvaluator {
    fn evaluate(&self, game: &Game, card: CardHandle) -> f32;
}

/// Generic target enumeration over the observable state.
///
/// Hexproof hides a permanent from opposing spells; protection colours
/// are card-specific and left to handler overrides.
#[must_use]
pub fn enumerate_targets(
    game: &Game,
    controller: PlayerId,
    req: &TargetRequirement,
) -> Vec<TargetRef> {
    let mut out = Vec::new();

    let mut push_permanents = |want: &dyn Fn(PlayerId, CardHandle) -> bool| {
        for player in PlayerId::apnap(controller) {
            for &card in &game.players[player].battlefield {
                if player != controller
                    && game
                        .card_data(card)
                        .is_some_and(|d| d.has_keyword(Keyword::Hexproof))
                {
                    continue;
                }
                if want(player, card) {
                    out.push(TargetRef::Card(card));
                }
            }
        }
    };

    match req.kind {
        TargetKind::Creature => {
            push_permanents(&|_, c| game.is_creature(c));
        }
        TargetKind::CreatureYouControl => {
            push_permanents(&|p, c| p == controller && game.is_creature(c));
        }
        TargetKind::CreatureOpponentControls => {
            push_permanents(&|p, c| p != controller && game.is_creature(c));
        }
        TargetKind::Permanent => {
            push_permanents(&|_, _| true);
        }
        TargetKind::Player => {
            out.push(TargetRef::Player(controller));
            out.push(TargetRef::Player(controller.opponent()));
        }
        TargetKind::Any => {
            push_permanents(&|_, c| {
                game.is_creature(c)
                    || game
                        .card_data(c)
                        .is_some_and(|d| d.types.is_planeswalker() || d.types.is_battle())
            });
            out.push(TargetRef::Player(controller));
            out.push(TargetRef::Player(controller.opponent()));
        }
        TargetKind::SpellOnStack => {
            for item in game.stack.items() {
                if item.is_spell() {
                    out.push(TargetRef::StackItem(item.id));
                }
            }
        }
        TargetKind::AbilityOnStack => {
            for item in game.stack.items() {
                if !item.is_spell() {
                    out.push(TargetRef::StackItem(item.id));
                }
            }
        }
    }

    out
}

/// Whether a chosen target is still legal at resolution time.
#[must_use]
pub fn target_still_valid(game: &Game, target: TargetRef) -> bool {
    match target {
        TargetRef::Player(_) => true,
        TargetRef::Card(handle) => game.store.is_live(handle),
        TargetRef::StackItem(id) => game.stack.get(id).is_some(),
    }
}
