//! Basic collaborator implementations.
//!
//! `BasicAbilityHandler` interprets nothing: tests and the vanilla card
//! subset register per-card effects, targeting requirements, and
//! trigger specs directly. `PoolManaSystem` pays costs from floating
//! mana and auto-tapped sources. `GreedyEvaluator` scores cards by
//! stats.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cards::{CardId, CounterKind, Keyword, ManaProduce};
use crate::core::{CardHandle, Color, ManaCost, ManaPool, PlayerId};
use crate::game::{EffectGrant, Game, GameEvent, PendingTrigger, ZonePlacement};
use crate::stack::{StackItem, StackItemKind, TargetRef};

use super::{
    target_still_valid, AbilityHandler, CardEvaluator, CostFailure, ManaSystem, ResolveFailure,
    ResponseRole, TargetRequirement,
};

/// A grant template; the acting player is bound when it is pushed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GrantKind {
    CreateToken { count: u8 },
    CopyPermanent,
    CopySpell,
    Populate,
    SearchLibrary,
    ReturnFromGraveyard,
    Reanimate,
    ReturnFromExile,
    AddCounter { kind: CounterKind, count: u8 },
    RemoveCounter,
    Proliferate,
    Clash,
    Discard { count: u8 },
}

impl GrantKind {
    #[must_use]
    pub fn for_player(self, player: PlayerId) -> EffectGrant {
        match self {
            GrantKind::CreateToken { count } => EffectGrant::CreateToken { player, count },
            GrantKind::CopyPermanent => EffectGrant::CopyPermanent { player },
            GrantKind::CopySpell => EffectGrant::CopySpell { player },
            GrantKind::Populate => EffectGrant::Populate { player },
            GrantKind::SearchLibrary => EffectGrant::SearchLibrary { player },
            GrantKind::ReturnFromGraveyard => EffectGrant::ReturnFromGraveyard { player },
            GrantKind::Reanimate => EffectGrant::Reanimate { player },
            GrantKind::ReturnFromExile => EffectGrant::ReturnFromExile { player },
            GrantKind::AddCounter { kind, count } => {
                EffectGrant::AddCounter { player, kind, count }
            }
            GrantKind::RemoveCounter => EffectGrant::RemoveCounter { player },
            GrantKind::Proliferate => EffectGrant::Proliferate { player },
            GrantKind::Clash => EffectGrant::Clash { player },
            GrantKind::Discard { count } => EffectGrant::Discard { player, count },
        }
    }
}

/// Declarative effect for a card, resolved by the basic handler.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimpleEffect {
    /// Deal damage to each chosen target.
    DealDamage { amount: i32 },
    DrawCards { count: u32 },
    GainLife { amount: i32 },
    /// Move each chosen permanent target to its owner's graveyard.
    Destroy,
    /// Remove each chosen stack-item target from the stack.
    CounterTarget,
    MillOpponent { count: u32 },
    Scry { count: u8 },
    Surveil { count: u8 },
    Grant(GrantKind),
    /// No effect (vanilla permanents).
    None,
}

/// When a registered trigger fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOn {
    /// This permanent enters the battlefield.
    SelfEnters,
    /// This permanent dies.
    SelfDies,
    /// This permanent attacks.
    SelfAttacks,
    /// Any creature dies while this permanent watches.
    AnyCreatureDies,
    /// The controller's upkeep begins.
    Upkeep,
}

/// The basic rules-text interpreter: a lookup table.
#[derive(Clone, Debug, Default)]
pub struct BasicAbilityHandler {
    effects: FxHashMap<CardId, SimpleEffect>,
    ability_effects: FxHashMap<(CardId, u8), SimpleEffect>,
    requirements: FxHashMap<CardId, TargetRequirement>,
    triggers: FxHashMap<CardId, Vec<(TriggerOn, SimpleEffect)>>,
    responses: FxHashMap<CardId, ResponseRole>,
}

impl BasicAbilityHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spell effect for a card.
    pub fn register_effect(&mut self, card: CardId, effect: SimpleEffect) {
        self.effects.insert(card, effect);
    }

    /// Register an effect for an activated ability index.
    pub fn register_ability_effect(&mut self, card: CardId, ability_idx: u8, effect: SimpleEffect) {
        self.ability_effects.insert((card, ability_idx), effect);
    }

    /// Register what a card targets.
    pub fn register_targeting(&mut self, card: CardId, req: TargetRequirement) {
        self.requirements.insert(card, req);
    }

    /// Register a card as a dedicated response.
    pub fn register_response(&mut self, card: CardId, role: ResponseRole) {
        self.responses.insert(card, role);
    }

    /// Register a triggered ability; the trigger id is its index in
    /// registration order.
    pub fn register_trigger(&mut self, card: CardId, on: TriggerOn, effect: SimpleEffect) {
        self.triggers.entry(card).or_default().push((on, effect));
    }

    fn apply_effect(
        &self,
        game: &mut Game,
        item: &StackItem,
        effect: SimpleEffect,
    ) -> Result<(), ResolveFailure> {
        let controller = item.controller;
        match effect {
            SimpleEffect::None => {}
            SimpleEffect::DealDamage { amount } => {
                for &target in &item.context.targets {
                    match target {
                        TargetRef::Player(p) => game.damage_player(self, None, p, amount),
                        TargetRef::Card(c) => game.damage_permanent(self, None, c, amount),
                        TargetRef::StackItem(_) => {}
                    }
                }
            }
            SimpleEffect::DrawCards { count } => {
                for _ in 0..count {
                    game.draw_card(self, controller);
                }
            }
            SimpleEffect::GainLife { amount } => {
                game.players[controller].life += amount;
                game.fire_event(
                    self,
                    GameEvent::LifeGained {
                        player: controller,
                        amount,
                    },
                );
            }
            SimpleEffect::Destroy => {
                for &target in &item.context.targets {
                    if let TargetRef::Card(c) = target {
                        if game.store.is_live(c)
                            && !self.has_keyword(game, c, Keyword::Indestructible)
                        {
                            let _ = game.move_card(
                                self,
                                c,
                                crate::core::Zone::Graveyard,
                                ZonePlacement::Top,
                                None,
                            );
                        }
                    }
                }
            }
            SimpleEffect::CounterTarget => {
                for &target in &item.context.targets {
                    if let TargetRef::StackItem(id) = target {
                        game.counter_stack_item(self, id);
                    }
                }
            }
            SimpleEffect::MillOpponent { count } => {
                game.mill(self, controller.opponent(), count as usize);
            }
            SimpleEffect::Scry { count } => {
                game.begin_scry(controller, count);
            }
            SimpleEffect::Surveil { count } => {
                game.begin_surveil(controller, count);
            }
            SimpleEffect::Grant(kind) => {
                game.push_grant(kind.for_player(controller));
            }
        }
        Ok(())
    }
}

impl AbilityHandler for BasicAbilityHandler {
    fn targeting_requirement(&self, _game: &Game, card_id: CardId) -> Option<TargetRequirement> {
        self.requirements.get(&card_id).copied()
    }

    fn response_role(&self, _game: &Game, card_id: CardId) -> Option<ResponseRole> {
        self.responses.get(&card_id).copied()
    }

    fn resolve(&self, game: &mut Game, item: &StackItem) -> Result<(), ResolveFailure> {
        // A targeted item whose every target is gone fizzles.
        if !item.context.targets.is_empty()
            && item
                .context
                .targets
                .iter()
                .all(|&t| !target_still_valid(game, t))
        {
            return Err(ResolveFailure::TargetsGone);
        }

        let effect = match &item.kind {
            StackItemKind::Spell { card_id, .. } => self
                .effects
                .get(card_id)
                .copied()
                .unwrap_or(SimpleEffect::None),
            StackItemKind::Ability {
                source,
                ability_idx,
            } => game
                .instance(*source)
                .and_then(|i| self.ability_effects.get(&(i.card_id, *ability_idx)))
                .copied()
                .unwrap_or(SimpleEffect::None),
            StackItemKind::Trigger { source, trigger_id } => game
                .instance(*source)
                .and_then(|i| self.triggers.get(&i.card_id))
                .and_then(|specs| specs.get(*trigger_id as usize))
                .map(|&(_, effect)| effect)
                .unwrap_or(SimpleEffect::None),
        };

        self.apply_effect(game, item, effect)
    }

    fn triggers_for(&self, game: &Game, event: &GameEvent) -> Vec<PendingTrigger> {
        let mut raised = Vec::new();

        let mut check = |source: CardHandle, controller: PlayerId, on_wanted: TriggerOn| {
            let Some(card_id) = game.instance(source).map(|i| i.card_id) else {
                return;
            };
            let Some(specs) = self.triggers.get(&card_id) else {
                return;
            };
            for (idx, &(on, _)) in specs.iter().enumerate() {
                if on == on_wanted {
                    raised.push(PendingTrigger {
                        source,
                        controller,
                        trigger_id: idx as u16,
                        event: event.clone(),
                    });
                }
            }
        };

        match *event {
            GameEvent::EntersBattlefield {
                card, controller, ..
            } => check(card, controller, TriggerOn::SelfEnters),
            GameEvent::Dies {
                card, controller, ..
            } => {
                check(card, controller, TriggerOn::SelfDies);
                for player in PlayerId::both() {
                    for &permanent in &game.players[player].battlefield {
                        check(permanent, player, TriggerOn::AnyCreatureDies);
                    }
                }
            }
            GameEvent::Attacks { card, controller } => {
                check(card, controller, TriggerOn::SelfAttacks);
            }
            GameEvent::PhaseBegins { phase, active } => {
                if phase == crate::core::Phase::Upkeep {
                    for &permanent in &game.players[active].battlefield {
                        check(permanent, active, TriggerOn::Upkeep);
                    }
                }
            }
            _ => {}
        }

        raised
    }
}

/// How a cost will be covered: pool spends plus sources to tap.
#[derive(Clone, Debug, Default)]
struct PaymentPlan {
    pool_spend: ManaPool,
    taps: Vec<CardHandle>,
}

/// Pays costs from the pool first, then auto-taps untapped sources.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolManaSystem;

impl PoolManaSystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Untapped mana sources a player could tap, with what each makes.
    fn sources(&self, game: &Game, player: PlayerId) -> Vec<(CardHandle, ManaProduce)> {
        let p = &game.players[player];
        p.battlefield
            .iter()
            .filter(|&&card| !p.is_tapped(card))
            .filter_map(|&card| {
                let data = game.card_data(card)?;
                let produce = data
                    .abilities
                    .iter()
                    .find_map(|a| a.produces.filter(|_| a.tap_cost))?;
                // Creatures must have shaken summoning sickness to tap.
                if data.is_creature() && p.is_summoning_sick(card) {
                    return None;
                }
                Some((card, produce))
            })
            .collect()
    }

    /// Greedy allocation: coloured pips from pool buckets then matching
    /// sources; generic (+X) from whatever is left.
    fn plan(
        &self,
        game: &Game,
        player: PlayerId,
        cost: &ManaCost,
        x: u32,
    ) -> Option<PaymentPlan> {
        let mut pool_left = game.players[player].pool;
        let mut sources = self.sources(game, player);
        let mut plan = PaymentPlan::default();

        for color in Color::ALL {
            let mut need = u32::from(cost.pips(color));
            let from_pool = need.min(u32::from(pool_left.of(color)));
            pool_left.remove(color, from_pool as u8);
            for _ in 0..from_pool {
                plan.pool_spend.add(color);
            }
            need -= from_pool;

            while need > 0 {
                let pos = sources
                    .iter()
                    .position(|&(_, p)| p == ManaProduce::Color(color))?;
                plan.taps.push(sources.remove(pos).0);
                need -= 1;
            }
        }

        let mut generic_need = u32::from(cost.generic) + x;
        // Colourless first, then any coloured bucket.
        let from_colorless = generic_need.min(u32::from(pool_left.colorless));
        for _ in 0..from_colorless {
            pool_left.colorless -= 1;
            plan.pool_spend.add_colorless();
        }
        generic_need -= from_colorless;
        for color in Color::ALL {
            while generic_need > 0 && pool_left.of(color) > 0 {
                pool_left.remove(color, 1);
                plan.pool_spend.add(color);
                generic_need -= 1;
            }
        }
        if generic_need > sources.len() as u32 {
            return None;
        }
        for _ in 0..generic_need {
            plan.taps.push(sources.remove(0).0);
        }

        Some(plan)
    }
}

impl ManaSystem for PoolManaSystem {
    fn can_pay(&self, game: &Game, player: PlayerId, cost: &ManaCost, x: u32) -> bool {
        self.plan(game, player, cost, x).is_some()
    }

    fn pay(
        &self,
        game: &mut Game,
        player: PlayerId,
        cost: &ManaCost,
        x: u32,
    ) -> Result<(), CostFailure> {
        let plan = self
            .plan(game, player, cost, x)
            .ok_or(CostFailure::InsufficientMana)?;

        let pool = &mut game.players[player].pool;
        for color in Color::ALL {
            if !pool.remove(color, plan.pool_spend.of(color)) {
                return Err(CostFailure::InsufficientMana);
            }
        }
        if pool.colorless < plan.pool_spend.colorless {
            return Err(CostFailure::InsufficientMana);
        }
        pool.colorless -= plan.pool_spend.colorless;

        for card in plan.taps {
            game.players[player].tap(card);
        }
        Ok(())
    }
}

/// Scores cards by printed stats plus a keyword bonus.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyEvaluator;

impl GreedyEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CardEvaluator for GreedyEvaluator {
    fn evaluate(&self, game: &Game, card: CardHandle) -> f32 {
        let power = game.power_of(card) as f32;
        let toughness = game.toughness_of(card) as f32;
        let keyword_bonus = game
            .card_data(card)
            .map(|d| d.keywords.len() as f32 * 0.5)
            .unwrap_or(0.0);
        power + toughness + keyword_bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{AbilityData, CardData, CardRegistry, CardType, TypeLine};
    use crate::core::{PlayerPair, Zone};
    use crate::game::GameConfig;

    fn forest() -> CardData {
        CardData::new(
            CardId::new(10),
            "Forest",
            TypeLine::of(CardType::Land).with_subtype("Forest"),
        )
        .with_ability(AbilityData::mana(ManaProduce::Color(Color::Green)))
    }

    fn game_with_lands(n: usize) -> Game {
        let mut registry = CardRegistry::new();
        registry.register(forest());
        let deck: Vec<CardId> = (0..20).map(|_| CardId::new(10)).collect();
        let mut game = Game::new(
            registry,
            GameConfig::default(),
            PlayerPair::with_value(deck),
            3,
        );
        let handler = BasicAbilityHandler::new();
        for _ in 0..n {
            let card = game.players[PlayerId::P1].hand[0];
            game.move_card(&handler, card, Zone::Battlefield, ZonePlacement::Top, None)
                .unwrap();
        }
        game
    }

    #[test]
    fn test_can_pay_from_untapped_lands() {
        let game = game_with_lands(3);
        let mana = PoolManaSystem::new();

        assert!(mana.can_pay(&game, PlayerId::P1, &ManaCost::generic(3), 0));
        assert!(mana.can_pay(
            &game,
            PlayerId::P1,
            &ManaCost::generic(1).with_pips(Color::Green, 2),
            0
        ));
        assert!(!mana.can_pay(&game, PlayerId::P1, &ManaCost::generic(4), 0));
        assert!(!mana.can_pay(
            &game,
            PlayerId::P1,
            &ManaCost::free().with_pips(Color::Red, 1),
            0
        ));
    }

    #[test]
    fn test_pay_taps_lands() {
        let mut game = game_with_lands(3);
        let mana = PoolManaSystem::new();

        mana.pay(&mut game, PlayerId::P1, &ManaCost::generic(2), 0)
            .unwrap();

        let tapped = game.players[PlayerId::P1]
            .battlefield
            .iter()
            .filter(|&&c| game.players[PlayerId::P1].is_tapped(c))
            .count();
        assert_eq!(tapped, 2);
    }

    #[test]
    fn test_pay_prefers_pool() {
        let mut game = game_with_lands(1);
        let mana = PoolManaSystem::new();
        game.players[PlayerId::P1].pool.add(Color::Green);

        mana.pay(
            &mut game,
            PlayerId::P1,
            &ManaCost::free().with_pips(Color::Green, 1),
            0,
        )
        .unwrap();

        // Floating mana was used; the land stays untapped.
        assert!(game.players[PlayerId::P1].pool.is_empty());
        let tapped = game.players[PlayerId::P1]
            .battlefield
            .iter()
            .filter(|&&c| game.players[PlayerId::P1].is_tapped(c))
            .count();
        assert_eq!(tapped, 0);
    }

    #[test]
    fn test_x_adds_to_generic() {
        let game = game_with_lands(2);
        let mana = PoolManaSystem::new();
        let cost = ManaCost::free().with_x();

        assert!(mana.can_pay(&game, PlayerId::P1, &cost, 2));
        assert!(!mana.can_pay(&game, PlayerId::P1, &cost, 3));
    }
}
