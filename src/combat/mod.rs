//! Combat: attacker and blocker declaration.
//!
//! The damage steps live in `damage`. Declaration follows the action
//! protocol: attackers accumulate one at a time (the most recent one
//! may be retargeted at a planeswalker or battle), a "done" action
//! commits them, blockers likewise. Ninjutsu swaps an unblocked
//! attacker for a ninja in hand during the blocker step.

mod damage;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cards::{Keyword, TypeLine};
use crate::core::{CardHandle, Phase, PlayerId, Zone};
use crate::game::{Game, GameEvent, ZonePlacement};
use crate::rules::{AbilityHandler, ManaSystem};

/// What an attacker is attacking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackTarget {
    Player(PlayerId),
    Planeswalker(CardHandle),
    Battle(CardHandle),
}

/// All combat bookkeeping for the current turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CombatState {
    /// Attackers in declaration order.
    pub attackers: Vec<CardHandle>,
    pub targets: FxHashMap<CardHandle, AttackTarget>,
    /// Attacker -> blockers in declaration order.
    pub blocks: FxHashMap<CardHandle, Vec<CardHandle>>,
    /// Locked damage-assignment order for multi-blocked attackers.
    pub damage_order: FxHashMap<CardHandle, Vec<CardHandle>>,
    /// The attacker subsequent BLOCK actions pile onto.
    pub multi_block_target: Option<CardHandle>,
    /// Planeswalker -> creature soaking its combat damage.
    pub protectors: FxHashMap<CardHandle, CardHandle>,
    /// Creatures that already dealt their combat damage (first strike).
    pub dealt_damage: FxHashSet<CardHandle>,
    pub attackers_committed: bool,
    pub blockers_committed: bool,
}

impl CombatState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether an attacker has at least one blocker assigned.
    #[must_use]
    pub fn is_blocked(&self, attacker: CardHandle) -> bool {
        self.blocks.get(&attacker).is_some_and(|b| !b.is_empty())
    }
}

impl Game {
    /// The player being attacked this combat.
    #[must_use]
    pub fn defending_player(&self) -> PlayerId {
        self.active.opponent()
    }

    /// Whether a permanent may be declared as an attacker.
    #[must_use]
    pub fn can_attack(&self, handler: &dyn AbilityHandler, card: CardHandle) -> bool {
        let Some(instance) = self.instance(card) else {
            return false;
        };
        if instance.controller != self.active || instance.zone != Zone::Battlefield {
            return false;
        }
        if !self.is_creature(card) {
            return false;
        }
        let p = &self.players[self.active];
        if p.is_tapped(card) {
            return false;
        }
        if handler.has_keyword(self, card, Keyword::Defender) {
            return false;
        }
        if p.is_summoning_sick(card) && !handler.has_keyword(self, card, Keyword::Haste) {
            return false;
        }
        true
    }

    /// Declare one attacker (default target: the defending player).
    pub fn declare_attacker(&mut self, handler: &dyn AbilityHandler, card: CardHandle) -> bool {
        if self.phase != Phase::DeclareAttackers
            || self.combat.attackers_committed
            || self.combat.attackers.contains(&card)
            || !self.can_attack(handler, card)
        {
            return false;
        }
        self.combat.attackers.push(card);
        self.combat
            .targets
            .insert(card, AttackTarget::Player(self.defending_player()));
        debug!(attacker = %card, "attacker declared");
        true
    }

    /// Planeswalkers the defending player controls, in battlefield order.
    #[must_use]
    pub fn defending_planeswalkers(&self) -> Vec<CardHandle> {
        self.players[self.defending_player()]
            .battlefield
            .iter()
            .copied()
            .filter(|&c| {
                self.type_line_of(c)
                    .is_some_and(TypeLine::is_planeswalker)
            })
            .collect()
    }

    /// Battles on the defending player's battlefield.
    #[must_use]
    pub fn defending_battles(&self) -> Vec<CardHandle> {
        self.players[self.defending_player()]
            .battlefield
            .iter()
            .copied()
            .filter(|&c| self.type_line_of(c).is_some_and(TypeLine::is_battle))
            .collect()
    }

    /// Point the most recently declared attacker at a planeswalker, by
    /// relative index over the defender's planeswalkers.
    pub fn attack_planeswalker(&mut self, rel_idx: usize) -> bool {
        if self.phase != Phase::DeclareAttackers {
            return false;
        }
        let Some(&attacker) = self.combat.attackers.last() else {
            return false;
        };
        let Some(&walker) = self.defending_planeswalkers().get(rel_idx) else {
            return false;
        };
        self.combat
            .targets
            .insert(attacker, AttackTarget::Planeswalker(walker));
        true
    }

    /// Point the most recently declared attacker at a battle.
    pub fn attack_battle(&mut self, rel_idx: usize) -> bool {
        if self.phase != Phase::DeclareAttackers {
            return false;
        }
        let Some(&attacker) = self.combat.attackers.last() else {
            return false;
        };
        let Some(&battle) = self.defending_battles().get(rel_idx) else {
            return false;
        };
        self.combat
            .targets
            .insert(attacker, AttackTarget::Battle(battle));
        true
    }

    /// Commit the attack: tap non-vigilant attackers, fire attack
    /// triggers, move to the blocker step (or straight to end of
    /// combat when nobody attacks).
    pub fn declare_attackers_done(&mut self, handler: &dyn AbilityHandler) -> bool {
        if self.phase != Phase::DeclareAttackers || self.combat.attackers_committed {
            return false;
        }
        self.combat.attackers_committed = true;

        let attackers = self.combat.attackers.clone();
        for &attacker in &attackers {
            if !handler.has_keyword(self, attacker, Keyword::Vigilance) {
                self.players[self.active].tap(attacker);
            }
            self.players[self.active].attacked_this_turn.insert(attacker);
            self.fire_event(
                handler,
                GameEvent::Attacks {
                    card: attacker,
                    controller: self.active,
                },
            );
        }

        let had_attackers = !attackers.is_empty();
        self.phase = if had_attackers {
            Phase::DeclareBlockers
        } else {
            Phase::EndOfCombat
        };
        if self.phase == Phase::EndOfCombat {
            self.on_end_of_combat(handler);
        }
        self.empty_mana_pools();
        self.assign_priority(if had_attackers {
            self.defending_player()
        } else {
            self.active
        });
        debug!(count = attackers.len(), "attackers committed");
        true
    }

    /// Whether a creature may block a given attacker.
    #[must_use]
    pub fn can_block(
        &self,
        handler: &dyn AbilityHandler,
        blocker: CardHandle,
        attacker: CardHandle,
    ) -> bool {
        let defender = self.defending_player();
        let Some(instance) = self.instance(blocker) else {
            return false;
        };
        if instance.controller != defender || instance.zone != Zone::Battlefield {
            return false;
        }
        if !self.is_creature(blocker) || self.players[defender].is_tapped(blocker) {
            return false;
        }
        if !self.combat.attackers.contains(&attacker) {
            return false;
        }

        // Evergreen evasion composition.
        if handler.has_keyword(self, attacker, Keyword::Flying)
            && !handler.has_keyword(self, blocker, Keyword::Flying)
            && !handler.has_keyword(self, blocker, Keyword::Reach)
        {
            return false;
        }

        // Protection from the blocker's colours.
        if let (Some(attacker_data), Some(blocker_data)) =
            (self.card_data(attacker), self.card_data(blocker))
        {
            if blocker_data
                .colors()
                .iter()
                .any(|c| attacker_data.protection_from.contains(c))
            {
                return false;
            }
        }

        // Card-specific restrictions.
        handler.can_block(self, blocker, attacker)
    }

    /// Assign a blocker. With no explicit attacker, the multi-block
    /// target (if armed) or the first unblocked attacker is chosen.
    pub fn declare_blocker(
        &mut self,
        handler: &dyn AbilityHandler,
        blocker: CardHandle,
        attacker: Option<CardHandle>,
    ) -> bool {
        if self.phase != Phase::DeclareBlockers || self.combat.blockers_committed {
            return false;
        }

        let attacker = match attacker.or(self.combat.multi_block_target) {
            Some(a) => a,
            None => {
                let Some(a) = self
                    .combat
                    .attackers
                    .iter()
                    .copied()
                    .find(|&a| !self.combat.is_blocked(a))
                    .or_else(|| self.combat.attackers.first().copied())
                else {
                    return false;
                };
                a
            }
        };

        if !self.can_block(handler, blocker, attacker) {
            return false;
        }
        let assigned = self.combat.blocks.entry(attacker).or_default();
        if assigned.contains(&blocker) {
            return false;
        }
        assigned.push(blocker);
        debug!(blocker = %blocker, attacker = %attacker, "block declared");
        true
    }

    /// Arm multi-blocking: subsequent BLOCK actions pile onto this
    /// attacker (by declaration-order index).
    pub fn arm_multi_block(&mut self, attacker_idx: usize) -> bool {
        if self.phase != Phase::DeclareBlockers {
            return false;
        }
        let Some(&attacker) = self.combat.attackers.get(attacker_idx) else {
            return false;
        };
        self.combat.multi_block_target = Some(attacker);
        true
    }

    /// Assign a blocker against the creature attacking a battle.
    pub fn defend_battle(
        &mut self,
        handler: &dyn AbilityHandler,
        battle: CardHandle,
        defender: CardHandle,
    ) -> bool {
        let attacker = self.combat.targets.iter().find_map(|(&a, &t)| {
            if t == AttackTarget::Battle(battle) {
                Some(a)
            } else {
                None
            }
        });
        let Some(attacker) = attacker else {
            return false;
        };
        self.declare_blocker(handler, defender, Some(attacker))
    }

    /// Assign a creature to soak combat damage aimed at a planeswalker.
    pub fn protect_planeswalker(&mut self, walker: CardHandle, protector: CardHandle) -> bool {
        if !self.store.is_live(walker) || !self.store.is_live(protector) {
            return false;
        }
        if !self.is_creature(protector) {
            return false;
        }
        self.combat.protectors.insert(walker, protector);
        true
    }

    /// Commit blocks: validate menace, fire block triggers, pick the
    /// damage step.
    pub fn declare_blockers_done(&mut self, handler: &dyn AbilityHandler) -> bool {
        if self.phase != Phase::DeclareBlockers || self.combat.blockers_committed {
            return false;
        }

        // Menace: one blocker is not a legal block.
        for (&attacker, blockers) in &self.combat.blocks {
            if blockers.len() == 1 && handler.has_keyword(self, attacker, Keyword::Menace) {
                debug!(attacker = %attacker, "menace violated");
                return false;
            }
        }
        self.combat.blockers_committed = true;

        let blocks: Vec<(CardHandle, Vec<CardHandle>)> = self
            .combat
            .blocks
            .iter()
            .map(|(&a, b)| (a, b.clone()))
            .collect();
        let defender = self.defending_player();
        for (attacker, blockers) in blocks {
            for blocker in blockers {
                self.fire_event(
                    handler,
                    GameEvent::Blocks {
                        blocker,
                        attacker,
                        controller: defender,
                    },
                );
            }
        }

        let first_strike = self.combat_has_first_strike(handler);
        self.phase = if first_strike {
            Phase::FirstStrikeDamage
        } else {
            Phase::CombatDamage
        };
        self.empty_mana_pools();
        self.assign_priority(self.active);
        true
    }

    /// Ninjutsu: return an unblocked attacker to hand, put the ninja
    /// onto the battlefield tapped and attacking, inheriting the
    /// attack target.
    pub fn ninjutsu(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
        ninja: CardHandle,
        attacker: CardHandle,
    ) -> bool {
        // Legal from blocker declaration until combat damage is dealt;
        // damage itself happens when the step is left.
        if !matches!(
            self.phase,
            Phase::DeclareBlockers | Phase::FirstStrikeDamage | Phase::CombatDamage
        ) {
            return false;
        }
        let player = self.active;
        if !self.players[player].hand.contains(&ninja) {
            return false;
        }
        let Some(cost) = self
            .card_data(ninja)
            .and_then(|d| d.keyword_cost(Keyword::Ninjutsu))
        else {
            return false;
        };
        if !self.combat.attackers.contains(&attacker) || self.combat.is_blocked(attacker) {
            return false;
        }
        if mana.pay(self, player, &cost, 0).is_err() {
            return false;
        }

        let target = self
            .combat
            .targets
            .get(&attacker)
            .copied()
            .unwrap_or(AttackTarget::Player(self.defending_player()));

        if self
            .move_card(handler, attacker, Zone::Hand, ZonePlacement::Top, None)
            .is_err()
        {
            return false;
        }
        let Ok(ninja_on_field) =
            self.move_card(handler, ninja, Zone::Battlefield, ZonePlacement::Top, None)
        else {
            return false;
        };
        self.players[player].tap(ninja_on_field);

        // Swap combat bookkeeping onto the ninja.
        self.combat.attackers.retain(|&a| a != attacker);
        self.combat.targets.remove(&attacker);
        self.combat.attackers.push(ninja_on_field);
        self.combat.targets.insert(ninja_on_field, target);
        self.players[player].attacked_this_turn.insert(ninja_on_field);
        debug!(ninja = %ninja_on_field, "ninjutsu swap");
        true
    }

    /// Any participant with first or double strike?
    #[must_use]
    pub fn combat_has_first_strike(&self, handler: &dyn AbilityHandler) -> bool {
        let participants = self
            .combat
            .attackers
            .iter()
            .copied()
            .chain(self.combat.blocks.values().flatten().copied());
        for card in participants {
            if handler.has_keyword(self, card, Keyword::FirstStrike)
                || handler.has_keyword(self, card, Keyword::DoubleStrike)
            {
                return true;
            }
        }
        false
    }

    /// End-of-combat housekeeping: trigger, then clear state.
    pub fn on_end_of_combat(&mut self, handler: &dyn AbilityHandler) {
        self.fire_event(handler, GameEvent::EndOfCombat);
        self.combat.clear();
    }
}
