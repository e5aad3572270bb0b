//! Combat damage: ordering, assignment, and the two damage steps.
//!
//! For a multi-blocked attacker the active player locks an assignment
//! order; damage then fills lethal amounts down the order, with
//! deathtouch making one point lethal and trample passing the excess
//! through to the original attack target.

use tracing::debug;

use crate::cards::Keyword;
use crate::core::{CardHandle, Phase};
use crate::game::Game;
use crate::rules::{AbilityHandler, CardEvaluator};

use super::AttackTarget;

impl Game {
    /// Lock an explicit damage-assignment order for an attacker. The
    /// order must be a permutation of its current blockers.
    pub fn set_damage_order(&mut self, attacker: CardHandle, order: Vec<CardHandle>) -> bool {
        let Some(blockers) = self.combat.blocks.get(&attacker) else {
            return false;
        };
        if order.len() != blockers.len() || !order.iter().all(|b| blockers.contains(b)) {
            return false;
        }
        self.combat.damage_order.insert(attacker, order);
        true
    }

    /// Default every multi-blocked attacker's order: cheapest kills
    /// first, scored by the evaluator ascending.
    pub fn default_damage_orders(&mut self, evaluator: &dyn CardEvaluator) {
        let multi: Vec<(CardHandle, Vec<CardHandle>)> = self
            .combat
            .blocks
            .iter()
            .filter(|(_, b)| b.len() > 1)
            .map(|(&a, b)| (a, b.clone()))
            .collect();

        for (attacker, mut blockers) in multi {
            blockers.sort_by(|&x, &y| {
                evaluator
                    .evaluate(self, x)
                    .partial_cmp(&evaluator.evaluate(self, y))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            self.combat.damage_order.insert(attacker, blockers);
        }
    }

    /// Does a creature deal damage in this step?
    fn deals_in_step(
        &self,
        handler: &dyn AbilityHandler,
        card: CardHandle,
        first_strike_step: bool,
    ) -> bool {
        let first = handler.has_keyword(self, card, Keyword::FirstStrike);
        let double = handler.has_keyword(self, card, Keyword::DoubleStrike);
        if first_strike_step {
            first || double
        } else {
            !first || double
        }
    }

    /// Deal one step of combat damage. Caller runs SBAs afterwards.
    pub fn deal_combat_damage(&mut self, handler: &dyn AbilityHandler, first_strike_step: bool) {
        debug_assert!(matches!(
            self.phase,
            Phase::FirstStrikeDamage | Phase::CombatDamage
        ));

        let attackers = self.combat.attackers.clone();
        for attacker in attackers {
            if !self.store.is_live(attacker)
                || !self.deals_in_step(handler, attacker, first_strike_step)
            {
                self.strike_back(handler, attacker, first_strike_step);
                continue;
            }

            let was_blocked = self.combat.blocks.contains_key(&attacker);
            let live_blockers: Vec<CardHandle> = self
                .combat
                .damage_order
                .get(&attacker)
                .or_else(|| self.combat.blocks.get(&attacker))
                .map(|b| {
                    b.iter()
                        .copied()
                        .filter(|&c| self.store.is_live(c))
                        .collect()
                })
                .unwrap_or_default();

            let power = self.power_of(attacker).max(0);
            let trample = handler.has_keyword(self, attacker, Keyword::Trample);
            let deathtouch = handler.has_keyword(self, attacker, Keyword::Deathtouch);
            let target = self
                .combat
                .targets
                .get(&attacker)
                .copied()
                .unwrap_or(AttackTarget::Player(self.defending_player()));

            if !was_blocked {
                self.damage_attack_target(handler, attacker, target, power);
            } else if live_blockers.is_empty() {
                // Blocked, blockers gone: only trample punches through.
                if trample {
                    self.damage_attack_target(handler, attacker, target, power);
                }
            } else {
                let mut remaining = power;
                for &blocker in &live_blockers {
                    if remaining <= 0 {
                        break;
                    }
                    let lethal = if deathtouch {
                        1
                    } else {
                        (self.toughness_of(blocker)
                            - self.instance(blocker).map_or(0, |i| i.damage))
                        .max(1)
                    };
                    let assigned = if trample { lethal.min(remaining) } else if live_blockers.len() == 1 {
                        remaining
                    } else {
                        lethal.min(remaining)
                    };
                    self.damage_permanent(handler, Some(attacker), blocker, assigned);
                    remaining -= assigned;
                }
                if trample && remaining > 0 {
                    self.damage_attack_target(handler, attacker, target, remaining);
                }
            }

            self.combat.dealt_damage.insert(attacker);
            self.strike_back(handler, attacker, first_strike_step);
        }
    }

    /// Blockers assigned to an attacker hit back if they deal in this
    /// step.
    fn strike_back(
        &mut self,
        handler: &dyn AbilityHandler,
        attacker: CardHandle,
        first_strike_step: bool,
    ) {
        let blockers: Vec<CardHandle> = self
            .combat
            .blocks
            .get(&attacker)
            .map(|b| b.clone())
            .unwrap_or_default();
        for blocker in blockers {
            if !self.store.is_live(blocker)
                || !self.deals_in_step(handler, blocker, first_strike_step)
                || self.combat.dealt_damage.contains(&blocker)
            {
                continue;
            }
            if !self.store.is_live(attacker) {
                continue;
            }
            let power = self.power_of(blocker).max(0);
            self.damage_permanent(handler, Some(blocker), attacker, power);
            self.combat.dealt_damage.insert(blocker);
        }
    }

    /// Damage to whatever an unblocked (or trampling) attacker is
    /// attacking. A protected planeswalker's damage goes to the
    /// protector instead.
    fn damage_attack_target(
        &mut self,
        handler: &dyn AbilityHandler,
        attacker: CardHandle,
        target: AttackTarget,
        amount: i32,
    ) {
        if amount <= 0 {
            return;
        }
        match target {
            AttackTarget::Player(player) => {
                self.damage_player(handler, Some(attacker), player, amount);
            }
            AttackTarget::Planeswalker(walker) => {
                if let Some(&protector) = self.combat.protectors.get(&walker) {
                    if self.store.is_live(protector) {
                        self.damage_permanent(handler, Some(attacker), protector, amount);
                        return;
                    }
                }
                if self.store.is_live(walker) {
                    self.damage_permanent(handler, Some(attacker), walker, amount);
                } else {
                    let defender = self.defending_player();
                    self.damage_player(handler, Some(attacker), defender, amount);
                }
            }
            AttackTarget::Battle(battle) => {
                if self.store.is_live(battle) {
                    self.damage_permanent(handler, Some(attacker), battle, amount);
                } else {
                    let defender = self.defending_player();
                    self.damage_player(handler, Some(attacker), defender, amount);
                }
            }
        }
    }

    /// Clear the first-strike dealt set between the two damage steps.
    /// Double strikers deal again; first-strike-only creatures do not.
    pub fn between_damage_steps(&mut self, handler: &dyn AbilityHandler) {
        let dealt = std::mem::take(&mut self.combat.dealt_damage);
        for card in dealt {
            // First-strike-only creatures stay marked as spent.
            if self.store.is_live(card)
                && handler.has_keyword(self, card, Keyword::FirstStrike)
                && !handler.has_keyword(self, card, Keyword::DoubleStrike)
            {
                self.combat.dealt_damage.insert(card);
            }
        }
        debug!("first strike damage complete");
    }
}

#[cfg(test)]
mod tests {
    use crate::cards::{CardData, CardId, CardInstance, CardRegistry, CardType, Keyword, TypeLine};
    use crate::core::{CardHandle, ManaCost, Phase, PlayerId, PlayerPair, Zone};
    use crate::game::{Game, GameConfig};
    use crate::rules::BasicAbilityHandler;

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(
            CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature))
                .with_stats(2, 2),
        );
        r.register(
            CardData::new(CardId::new(2), "Hill Giant", TypeLine::of(CardType::Creature))
                .with_stats(3, 3),
        );
        r.register(
            CardData::new(
                CardId::new(3),
                "Fencing Ace",
                TypeLine::of(CardType::Creature),
            )
            .with_cost(ManaCost::generic(1))
            .with_stats(2, 2)
            .with_keyword(Keyword::FirstStrike),
        );
        r.register(
            CardData::new(
                CardId::new(4),
                "Trampling Boar",
                TypeLine::of(CardType::Creature),
            )
            .with_stats(4, 4)
            .with_keyword(Keyword::Trample),
        );
        r
    }

    fn game() -> (Game, BasicAbilityHandler) {
        let deck: Vec<CardId> = (0..20).map(|_| CardId::new(1)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            13,
        );
        game.phase = Phase::DeclareAttackers;
        (game, BasicAbilityHandler::new())
    }

    fn put(game: &mut Game, player: PlayerId, card_id: CardId) -> CardHandle {
        let instance = CardInstance::new(card_id, player, Zone::Battlefield);
        let handle = game.store.alloc(instance);
        game.players[player].battlefield.push(handle);
        handle
    }

    #[test]
    fn test_unblocked_damage_hits_player() {
        let (mut game, handler) = game();
        let bear = put(&mut game, PlayerId::P1, CardId::new(1));
        game.declare_attacker(&handler, bear);
        game.declare_attackers_done(&handler);
        game.declare_blockers_done(&handler);

        game.deal_combat_damage(&handler, false);

        assert_eq!(game.players[PlayerId::P2].life, 18);
    }

    #[test]
    fn test_blocked_exchange() {
        let (mut game, handler) = game();
        let bear = put(&mut game, PlayerId::P1, CardId::new(1));
        let giant = put(&mut game, PlayerId::P2, CardId::new(2));

        game.declare_attacker(&handler, bear);
        game.declare_attackers_done(&handler);
        game.declare_blocker(&handler, giant, Some(bear));
        game.declare_blockers_done(&handler);

        game.deal_combat_damage(&handler, false);

        assert_eq!(game.players[PlayerId::P2].life, 20);
        assert_eq!(game.instance(bear).unwrap().damage, 3);
        assert_eq!(game.instance(giant).unwrap().damage, 2);
        // Bear dies, giant survives after SBAs.
        game.run_sbas(&handler);
        assert!(game.instance(bear).is_none());
        assert!(game.instance(giant).is_some());
    }

    #[test]
    fn test_first_strike_kills_before_return_damage() {
        let (mut game, handler) = game();
        let ace = put(&mut game, PlayerId::P1, CardId::new(3));
        let bear = put(&mut game, PlayerId::P2, CardId::new(1));

        game.declare_attacker(&handler, ace);
        game.declare_attackers_done(&handler);
        game.declare_blocker(&handler, bear, Some(ace));
        assert!(game.declare_blockers_done(&handler));
        assert_eq!(game.phase, Phase::FirstStrikeDamage);

        game.deal_combat_damage(&handler, true);
        game.run_sbas(&handler);
        assert!(game.instance(bear).is_none());
        assert_eq!(game.instance(ace).unwrap().damage, 0);

        // Normal step: the ace already dealt; nothing happens.
        game.between_damage_steps(&handler);
        game.phase = Phase::CombatDamage;
        game.deal_combat_damage(&handler, false);
        assert_eq!(game.players[PlayerId::P2].life, 20);
    }

    #[test]
    fn test_trample_excess_to_player() {
        let (mut game, handler) = game();
        let boar = put(&mut game, PlayerId::P1, CardId::new(4));
        let bear = put(&mut game, PlayerId::P2, CardId::new(1));

        game.declare_attacker(&handler, boar);
        game.declare_attackers_done(&handler);
        game.declare_blocker(&handler, bear, Some(boar));
        game.declare_blockers_done(&handler);

        game.deal_combat_damage(&handler, false);

        // 2 lethal to the bear, 2 through to the player.
        assert_eq!(game.instance(bear).unwrap().damage, 2);
        assert_eq!(game.players[PlayerId::P2].life, 18);
    }

    #[test]
    fn test_multi_block_order_fill() {
        let (mut game, handler) = game();
        let giant = put(&mut game, PlayerId::P1, CardId::new(2));
        let bear1 = put(&mut game, PlayerId::P2, CardId::new(1));
        let bear2 = put(&mut game, PlayerId::P2, CardId::new(1));

        game.declare_attacker(&handler, giant);
        game.declare_attackers_done(&handler);
        game.declare_blocker(&handler, bear1, Some(giant));
        game.declare_blocker(&handler, bear2, Some(giant));
        game.declare_blockers_done(&handler);
        assert!(game.set_damage_order(giant, vec![bear2, bear1]));

        game.deal_combat_damage(&handler, false);
        game.run_sbas(&handler);

        // 3 power: 2 lethal to bear2, 1 left to bear1.
        assert!(game.instance(bear2).is_none());
        assert!(game.instance(bear1).is_some());
        assert_eq!(game.instance(bear1).unwrap().damage, 1);
        // Giant took 4 and dies.
        assert!(game.instance(giant).is_none());
    }
}
