//! Stack resolution: popping the top item and dispatching its effects.
//!
//! Spells move from the stack onto the battlefield or into the
//! graveyard (or wherever their cast method redirects); abilities and
//! triggers hand their stored context to the ability handler. After
//! every resolution the active player gets priority back and the pass
//! counter resets.

use tracing::debug;

use crate::cards::{CardId, CounterKind, TypeLine};
use crate::core::{PlayerId, Zone};
use crate::game::{Game, ZonePlacement};
use crate::rules::{target_still_valid, AbilityHandler};

use super::{CastMethod, ResponseKind, StackItemKind, TargetRef};

impl Game {
    /// Remove a stack item by id (counterspell, stifle). A countered
    /// spell's card goes to its owner's graveyard.
    pub fn counter_stack_item(&mut self, handler: &dyn AbilityHandler, id: u32) -> bool {
        let Some(item) = self.stack.remove(id) else {
            return false;
        };
        debug!(id, "stack item countered");
        if let StackItemKind::Spell { card, .. } = item.kind {
            let _ = self.move_card(handler, card, Zone::Graveyard, ZonePlacement::Top, None);
        }
        true
    }

    /// Resolve the top item of the stack.
    ///
    /// Failures (all targets gone, handler refusal) remove the item
    /// with no effect, per the resolution-failure contract. Returns
    /// true if an item was popped.
    pub fn resolve_top_of_stack(&mut self, handler: &dyn AbilityHandler) -> bool {
        let Some(item) = self.stack.pop() else {
            return false;
        };
        debug!(id = item.id, controller = %item.controller, "resolving stack item");

        // Core-resolved response semantics.
        if let Some(response) = item.context.response {
            match response {
                ResponseKind::CounterSpell { target }
                | ResponseKind::CounterAbility { target }
                | ResponseKind::Stifle { target } => {
                    self.counter_stack_item(handler, target);
                }
                ResponseKind::PreventDamage { amount } => {
                    self.prevention[item.controller] += amount;
                }
                ResponseKind::RedirectDamage => {
                    if let Some(TargetRef::Card(permanent)) = item.context.targets.first() {
                        self.redirect[item.controller] = Some(*permanent);
                    }
                }
            }
        }

        let fizzled = !item.context.targets.is_empty()
            && item
                .context
                .targets
                .iter()
                .all(|&t| !target_still_valid(self, t));

        let handler_ok = if fizzled {
            false
        } else {
            handler.resolve(self, &item).is_ok()
        };

        match item.kind {
            StackItemKind::Spell { card, card_id } => {
                self.finish_spell(handler, &item, card, card_id, handler_ok);
            }
            StackItemKind::Ability { .. } | StackItemKind::Trigger { .. } => {}
        }

        self.assign_priority(self.active);
        if self.stack.is_empty() && self.phase == crate::core::Phase::Priority {
            self.leave_subphase();
        }
        true
    }

    fn finish_spell(
        &mut self,
        handler: &dyn AbilityHandler,
        item: &super::StackItem,
        card: crate::core::CardHandle,
        card_id: CardId,
        resolved: bool,
    ) {
        let context = &item.context;
        let becomes_permanent = resolved
            && self
                .cast_face_types(card_id, context.cast_method)
                .is_some_and(TypeLine::is_permanent);

        if becomes_permanent {
            let Ok(permanent) = self.move_card(
                handler,
                card,
                Zone::Battlefield,
                ZonePlacement::Top,
                Some(item.controller),
            ) else {
                return;
            };

            if context.face_down {
                if let Some(instance) = self.store.get_mut(permanent) {
                    instance.face_down = true;
                    instance.morphed = true;
                }
            }
            if let Some(n) = context.impending {
                if let Some(instance) = self.store.get_mut(permanent) {
                    instance.add_counters(CounterKind::Time, i32::from(n));
                }
            }
            if context.offspring {
                self.create_token_of(handler, card_id, item.controller);
            }
            if context.cast_method == CastMethod::Bestow {
                if let Some(&TargetRef::Card(host)) = context.targets.first() {
                    if self.store.is_live(host) {
                        self.players[item.controller].attachments.insert(permanent, host);
                    }
                }
            }
            match context.cast_method {
                CastMethod::Dash | CastMethod::Blitz => self.return_at_eot.push(permanent),
                CastMethod::Unearth => self.exile_at_eot.push(permanent),
                CastMethod::Encore | CastMethod::Eternalize | CastMethod::Embalm => {
                    // These make the permanent a token in full rules;
                    // the end-of-turn exile is the part that matters.
                    if context.cast_method == CastMethod::Encore {
                        self.exile_at_eot.push(permanent);
                    }
                }
                _ => {}
            }
        } else {
            let destination = context
                .cast_method
                .post_resolution_zone()
                .unwrap_or(Zone::Graveyard);
            let _ = self.move_card(handler, card, destination, ZonePlacement::Top, None);
        }
    }

    /// The type line a spell resolves with, given its cast method.
    pub(crate) fn cast_face_types(
        &self,
        card_id: CardId,
        method: CastMethod,
    ) -> Option<&TypeLine> {
        let data = self.registry.get(card_id)?;
        match method {
            CastMethod::MdfcBack => data.back_face().map(|f| &f.types),
            CastMethod::Adventure => data.adventure_face().map(|f| &f.types),
            CastMethod::LeftHalf | CastMethod::Fuse => {
                data.split_halves().map(|(l, _)| &l.types)
            }
            CastMethod::RightHalf | CastMethod::Aftermath => {
                data.split_halves().map(|(_, r)| &r.types)
            }
            _ => Some(&data.types),
        }
    }

    /// Drain pending triggers onto the stack in APNAP order: the active
    /// player's triggers first (so the non-active player's resolve
    /// first, LIFO). Returns true if anything was stacked.
    pub fn drain_triggers_to_stack(&mut self) -> bool {
        if self.pending_triggers.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut self.pending_triggers);
        let (active, nonactive): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|t| t.controller == self.active);

        for trigger in active.into_iter().chain(nonactive) {
            debug!(trigger_id = trigger.trigger_id, "trigger onto stack");
            self.stack.push(
                StackItemKind::Trigger {
                    source: trigger.source,
                    trigger_id: trigger.trigger_id,
                },
                trigger.controller,
                super::SpellContext::default(),
            );
        }
        self.assign_priority(self.active);
        if self.phase.is_turn_phase() {
            self.enter_subphase(crate::core::Phase::Priority);
        }
        true
    }

    /// Whether both players have passed on the current stack top.
    #[must_use]
    pub fn both_passed(&self) -> bool {
        self.passes >= 2
    }

    /// Priority holder sanity for interactive phases: someone must hold
    /// priority whenever the stack is non-empty and no split-second
    /// item gates it.
    #[must_use]
    pub fn priority_invariant_holds(&self) -> bool {
        if self.stack.is_empty() || self.stack.split_second_active() {
            return true;
        }
        !self.phase.is_interactive() || self.priority.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardData, CardRegistry, CardType};
    use crate::core::{ManaCost, PlayerPair};
    use crate::game::GameConfig;
    use crate::rules::{BasicAbilityHandler, SimpleEffect};
    use crate::stack::SpellContext;

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(
            CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::generic(2))
                .with_stats(2, 2),
        );
        r.register(
            CardData::new(CardId::new(2), "Bolt", TypeLine::of(CardType::Instant))
                .with_cost(ManaCost::generic(1)),
        );
        r
    }

    fn game() -> Game {
        let deck: Vec<CardId> = (0..20)
            .map(|i| CardId::new(if i % 2 == 0 { 1 } else { 2 }))
            .collect();
        Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            11,
        )
    }

    fn put_spell_on_stack(game: &mut Game, player: PlayerId, want: CardId) -> u32 {
        let handler = BasicAbilityHandler::new();
        let card = *game.players[player]
            .hand
            .iter()
            .find(|&&h| game.instance(h).unwrap().card_id == want)
            .expect("card in hand");
        let card = game
            .move_card(&handler, card, Zone::Stack, ZonePlacement::Top, None)
            .unwrap();
        game.stack.push(
            StackItemKind::Spell { card, card_id: want },
            player,
            SpellContext::default(),
        )
    }

    #[test]
    fn test_permanent_spell_resolves_to_battlefield() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        put_spell_on_stack(&mut game, PlayerId::P1, CardId::new(1));

        assert!(game.resolve_top_of_stack(&handler));

        assert!(game.stack.is_empty());
        assert_eq!(game.players[PlayerId::P1].battlefield.len(), 1);
        assert_eq!(game.priority, Some(PlayerId::P1));
    }

    #[test]
    fn test_instant_resolves_to_graveyard() {
        let mut game = game();
        let mut handler = BasicAbilityHandler::new();
        handler.register_effect(CardId::new(2), SimpleEffect::DealDamage { amount: 3 });
        let id = put_spell_on_stack(&mut game, PlayerId::P1, CardId::new(2));
        game.stack
            .get_mut(id)
            .unwrap()
            .context
            .targets
            .push(TargetRef::Player(PlayerId::P2));

        game.resolve_top_of_stack(&handler);

        assert_eq!(game.players[PlayerId::P2].life, 17);
        assert_eq!(game.players[PlayerId::P1].graveyard.len(), 1);
    }

    #[test]
    fn test_counter_removes_and_buries() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        let id = put_spell_on_stack(&mut game, PlayerId::P1, CardId::new(1));

        assert!(game.counter_stack_item(&handler, id));

        assert!(game.stack.is_empty());
        assert_eq!(game.players[PlayerId::P1].graveyard.len(), 1);
        assert!(game.players[PlayerId::P1].battlefield.is_empty());
    }

    #[test]
    fn test_fizzle_when_all_targets_gone() {
        let mut game = game();
        let mut handler = BasicAbilityHandler::new();
        handler.register_effect(CardId::new(2), SimpleEffect::DealDamage { amount: 3 });
        let id = put_spell_on_stack(&mut game, PlayerId::P1, CardId::new(2));

        // Target a bear, then kill the bear before resolution.
        let bear = game.players[PlayerId::P2].hand[0];
        let bear = game
            .move_card(&handler, bear, Zone::Battlefield, ZonePlacement::Top, None)
            .unwrap();
        game.stack
            .get_mut(id)
            .unwrap()
            .context
            .targets
            .push(TargetRef::Card(bear));
        game.move_card(&handler, bear, Zone::Graveyard, ZonePlacement::Top, None)
            .unwrap();

        let p2_life = game.players[PlayerId::P2].life;
        game.resolve_top_of_stack(&handler);

        // No effect; the spell card still ends up in the graveyard.
        assert_eq!(game.players[PlayerId::P2].life, p2_life);
        assert_eq!(game.players[PlayerId::P1].graveyard.len(), 1);
    }

    #[test]
    fn test_trigger_drain_apnap_order() {
        let mut game = game();
        game.active = PlayerId::P1;
        let source = game.players[PlayerId::P1].hand[0];
        let handler = BasicAbilityHandler::new();
        let source = game
            .move_card(&handler, source, Zone::Battlefield, ZonePlacement::Top, None)
            .unwrap();

        for controller in [PlayerId::P2, PlayerId::P1] {
            game.pending_triggers.push(crate::game::PendingTrigger {
                source,
                controller,
                trigger_id: 0,
                event: crate::game::GameEvent::EndOfCombat,
            });
        }

        assert!(game.drain_triggers_to_stack());

        // Active player's trigger went on first: non-active on top.
        let items = game.stack.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].controller, PlayerId::P1);
        assert_eq!(items[1].controller, PlayerId::P2);
    }
}
