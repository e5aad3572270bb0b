//! The cast pipeline and alternative-cost handlers.
//!
//! Casting is a staged protocol driven one action at a time:
//!
//! 1. optional-cost decisions on a pending spell (kicker, additional,
//!    escalate, spree, offspring, impending),
//! 2. mode selection for modal spells,
//! 3. commit: pay the mana, move the card onto the stack,
//! 4. X choice and targeting against the committed stack item.
//!
//! Every alternative cost (flashback, escape, madness, delve, ...) is
//! a variant of the same path with a different source zone, cost
//! lookup, and post-resolution rule.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cards::{CardId, CardLayout, CounterKind, Keyword, TypeLine};
use crate::core::{CardHandle, ManaCost, Phase, PlayerId, Zone};
use crate::game::{Game, GameEvent, ZonePlacement};
use crate::rules::{AbilityHandler, ManaSystem};
use crate::stack::{CastMethod, SpellContext, StackItemKind};

/// Impending permanents enter with this many time counters.
const IMPENDING_COUNTERS: u8 = 4;
/// Suspended cards wait this many upkeeps.
const SUSPEND_COUNTERS: i32 = 3;

/// Extra inputs some cast methods need (cost components chosen up
/// front).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CastExtras {
    /// Jump-start: hand index to discard.
    pub discard_hand_idx: Option<usize>,
    /// Escape / delve: graveyard cards to exile.
    pub exile_from_graveyard: Vec<CardHandle>,
    /// Emerge: creature to sacrifice.
    pub sacrifice: Option<CardHandle>,
}

/// A spell whose optional cost decisions are not yet finalised. The
/// card has not left its source zone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingSpell {
    pub card: CardHandle,
    pub card_id: CardId,
    pub controller: PlayerId,
    pub context: SpellContext,
    /// Base mana cost computed at begin (delve/emerge reductions baked
    /// in); riders are added at commit.
    pub base_cost: ManaCost,

    pub kicker_decided: bool,
    pub additional_decided: bool,
    /// The additional sacrifice has been performed.
    pub additional_paid: bool,
    pub modes_chosen: bool,
}

impl PendingSpell {
    /// Bare pending spell for unit tests of the choice protocols.
    #[doc(hidden)]
    #[must_use]
    pub fn stub_for_tests(controller: PlayerId) -> Self {
        Self {
            card: CardHandle::new(0, 0),
            card_id: CardId::new(0),
            controller,
            context: SpellContext::default(),
            base_cost: ManaCost::free(),
            kicker_decided: false,
            additional_decided: false,
            additional_paid: false,
            modes_chosen: false,
        }
    }
}

impl Game {
    // === Lands ===

    /// Play a land from hand: a special action, no stack.
    pub fn play_land(
        &mut self,
        handler: &dyn AbilityHandler,
        player: PlayerId,
        card: CardHandle,
        as_back_face: bool,
    ) -> bool {
        if self.players[player].land_played || !self.players[player].hand.contains(&card) {
            return false;
        }
        let Some(data) = self.card_data(card) else {
            return false;
        };
        let is_land_face = if as_back_face {
            data.back_face().is_some_and(|f| f.types.is_land())
        } else {
            data.is_land()
        };
        if !is_land_face {
            return false;
        }

        let Ok(on_field) =
            self.move_card(handler, card, Zone::Battlefield, ZonePlacement::Top, None)
        else {
            return false;
        };
        if as_back_face {
            if let Some(instance) = self.store.get_mut(on_field) {
                instance.transformed = true;
            }
        }
        self.players[player].land_played = true;
        debug!(player = %player, "land played");
        true
    }

    // === The generic cast path ===

    /// Begin casting. Depending on the card this either parks a
    /// pending spell awaiting optional-cost decisions, opens mode
    /// selection, or commits straight to the stack.
    pub fn begin_cast(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
        player: PlayerId,
        card: CardHandle,
        method: CastMethod,
        extras: &CastExtras,
    ) -> bool {
        if self.pending_spell.is_some() {
            return false;
        }
        let Some(instance) = self.instance(card) else {
            return false;
        };
        let card_id = instance.card_id;
        let source_zone = instance.zone;

        if !self.validate_cast_source(player, card, method) {
            return false;
        }
        let Some(cost) = self.cast_cost(card_id, method, extras) else {
            return false;
        };
        if !mana.can_pay(self, player, &cost, 0) {
            return false;
        }

        // Non-mana cost components are paid up front.
        if !self.pay_cast_extras(handler, player, method, extras) {
            return false;
        }

        let mut context = SpellContext::for_method(method, source_zone);
        let data = self.registry.get(card_id);
        context.split_second = data.is_some_and(|d| d.has_keyword(Keyword::SplitSecond));
        if method == CastMethod::Impending {
            context.impending = Some(IMPENDING_COUNTERS);
        }

        let pending = PendingSpell {
            card,
            card_id,
            controller: player,
            context,
            base_cost: cost,
            kicker_decided: false,
            additional_decided: false,
            additional_paid: false,
            modes_chosen: false,
        };
        self.pending_spell = Some(pending);
        self.advance_pending_cast(handler, mana)
    }

    /// Decisions still outstanding on the pending spell?
    #[must_use]
    pub fn pending_decisions_outstanding(&self) -> bool {
        let Some(pending) = &self.pending_spell else {
            return false;
        };
        let Some(data) = self.registry.get(pending.card_id) else {
            return false;
        };
        if data.has_keyword(Keyword::Kicker) && !pending.kicker_decided {
            return true;
        }
        if data.additional_sacrifice.is_some() && !pending.additional_decided {
            return true;
        }
        if data.has_keyword(Keyword::Spree) && pending.context.modes.is_empty() {
            return true;
        }
        false
    }

    /// Drive the pending spell forward: once decisions are done, pick
    /// modes, then commit. Returns false only on hard failure.
    pub fn advance_pending_cast(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
    ) -> bool {
        if self.pending_decisions_outstanding() {
            return true; // The mask exposes the decision actions.
        }
        if self.sacrifice.is_some() || self.choice.is_some() {
            return true; // A cost sub-protocol is running.
        }

        let Some(pending) = &self.pending_spell else {
            return false;
        };
        let data = self.registry.get(pending.card_id);
        let is_spree = data.is_some_and(|d| d.has_keyword(Keyword::Spree));
        if let Some(modes) = data.and_then(|d| d.modes) {
            // Spree modes arrive via SELECT_SPREE_MODE instead.
            if !pending.modes_chosen && !is_spree {
                let controller = pending.controller;
                self.begin_mode_choice(controller, modes.available, modes.min, modes.max);
                return true;
            }
        }

        self.commit_pending_cast(handler, mana)
    }

    /// Pay the mana and put the spell onto the stack.
    fn commit_pending_cast(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
    ) -> bool {
        let Some(pending) = self.pending_spell.take() else {
            return false;
        };
        let mut cost = pending.base_cost;

        // Optional cost riders.
        let data = self.registry.get(pending.card_id);
        if pending.context.kicked {
            if let Some(kicker) = data.and_then(|d| d.keyword_cost(Keyword::Kicker)) {
                cost.generic = cost.generic.saturating_add(kicker.generic);
                for color in crate::core::Color::ALL {
                    cost = cost.with_pips(color, kicker.pips(color));
                }
            }
        }
        let per_mode_tax = if pending.context.escalate > 0 {
            data.and_then(|d| d.keyword_cost(Keyword::Escalate))
        } else if data.is_some_and(|d| d.has_keyword(Keyword::Spree))
            && pending.context.modes.len() > 1
        {
            data.and_then(|d| d.keyword_cost(Keyword::Spree))
        } else {
            None
        };
        if let Some(tax) = per_mode_tax {
            let times = if pending.context.escalate > 0 {
                pending.context.escalate
            } else {
                pending.context.modes.len() as u8 - 1
            };
            cost.generic = cost.generic.saturating_add(tax.generic * times);
        }
        if pending.context.offspring {
            if let Some(offspring) = data.and_then(|d| d.keyword_cost(Keyword::Offspring)) {
                cost.generic = cost.generic.saturating_add(offspring.generic);
            }
        }

        if mana.pay(self, pending.controller, &cost, 0).is_err() {
            // Decisions were already validated as affordable; a failure
            // here means the pool changed underneath us. Drop the cast.
            self.pending_spell = Some(pending);
            return false;
        }

        let Ok(on_stack) = self.move_card(
            handler,
            pending.card,
            Zone::Stack,
            ZonePlacement::Top,
            None,
        ) else {
            return false;
        };
        if self.madness_window == Some(pending.card) {
            self.madness_window = None;
        }

        let item_id = self.stack.push(
            StackItemKind::Spell {
                card: on_stack,
                card_id: pending.card_id,
            },
            pending.controller,
            pending.context.clone(),
        );
        self.fire_event(
            handler,
            GameEvent::SpellCast {
                card_id: pending.card_id,
                controller: pending.controller,
            },
        );

        if self.phase.is_turn_phase() {
            self.enter_subphase(Phase::Priority);
        }
        self.assign_priority(pending.controller);

        self.open_post_commit_contexts(handler, item_id);
        debug!(item = item_id, card = %pending.card_id, "spell committed");
        true
    }

    /// X choice, then targeting, for a freshly committed item.
    pub fn open_post_commit_contexts(&mut self, handler: &dyn AbilityHandler, item_id: u32) {
        let Some(item) = self.stack.get(item_id) else {
            return;
        };
        let controller = item.controller;
        let StackItemKind::Spell { card_id, .. } = item.kind else {
            return;
        };

        let has_x = self
            .registry
            .get(card_id)
            .is_some_and(|d| d.mana_cost.has_x);
        if has_x && item.context.x.is_none() {
            self.begin_x_choice(item_id, controller);
            return;
        }
        if !item.context.targets_chosen {
            if let Some(req) = handler.targeting_requirement(self, card_id) {
                self.begin_targeting(item_id, controller, req);
            }
        }
    }

    // === Pending-spell decisions ===

    /// PAY_KICKER yes/no.
    pub fn pending_pay_kicker(&mut self, mana: &dyn ManaSystem, pay: bool) -> bool {
        let Some(pending) = &self.pending_spell else {
            return false;
        };
        if pending.kicker_decided {
            return false;
        }
        let controller = pending.controller;
        let Some(data) = self.registry.get(pending.card_id) else {
            return false;
        };
        let Some(kicker_cost) = data.keyword_cost(Keyword::Kicker) else {
            return false;
        };
        let base = data.mana_cost;

        if pay {
            let mut total = base;
            total.generic = total.generic.saturating_add(kicker_cost.generic);
            for color in crate::core::Color::ALL {
                total = total.with_pips(color, kicker_cost.pips(color));
            }
            if !mana.can_pay(self, controller, &total, 0) {
                return false;
            }
        }
        let pending = self.pending_spell.as_mut().expect("checked above");
        pending.context.kicked = pay;
        pending.kicker_decided = true;
        true
    }

    /// PAY_ADDITIONAL yes/no: "yes" opens the sacrifice sub-protocol
    /// for the declared component.
    pub fn pending_pay_additional(&mut self, pay: bool) -> bool {
        let Some(pending) = &self.pending_spell else {
            return false;
        };
        if pending.additional_decided {
            return false;
        }
        let controller = pending.controller;
        let Some(filter) = self
            .registry
            .get(pending.card_id)
            .and_then(|d| d.additional_sacrifice)
        else {
            return false;
        };

        let pending = self.pending_spell.as_mut().expect("checked above");
        pending.additional_decided = true;
        if pay {
            self.begin_sacrifice(None, controller, filter, 1);
        }
        true
    }

    /// PAY_ESCALATE: buy this many extra modes.
    pub fn pending_pay_escalate(&mut self, extra_modes: u8) -> bool {
        let Some(pending) = &mut self.pending_spell else {
            return false;
        };
        pending.context.escalate = extra_modes;
        true
    }

    /// PAY_OFFSPRING_COST: a token copy will be created on resolution.
    pub fn pending_pay_offspring(&mut self) -> bool {
        let Some(pending) = &mut self.pending_spell else {
            return false;
        };
        if pending.context.offspring {
            return false;
        }
        pending.context.offspring = true;
        true
    }

    /// SELECT_SPREE_MODE: add one spree mode to the pending spell.
    pub fn pending_select_spree_mode(&mut self, mode_idx: u8) -> bool {
        let Some(pending) = &mut self.pending_spell else {
            return false;
        };
        let Some(data) = self.registry.get(pending.card_id) else {
            return false;
        };
        if !data.has_keyword(Keyword::Spree) {
            return false;
        }
        let available = data.modes.map_or(2, |m| m.available);
        if mode_idx >= available || pending.context.modes.contains(&mode_idx) {
            return false;
        }
        pending.context.modes.push(mode_idx);
        pending.modes_chosen = true;
        true
    }

    // === Method validation and costs ===

    fn validate_cast_source(&self, player: PlayerId, card: CardHandle, method: CastMethod) -> bool {
        let Some(instance) = self.instance(card) else {
            return false;
        };
        if instance.owner != player {
            return false;
        }
        match method {
            m if m.casts_from_graveyard() => {
                instance.zone == Zone::Graveyard && self.players[player].graveyard.contains(&card)
            }
            CastMethod::Madness => {
                instance.zone == Zone::Exile && self.madness_window == Some(card)
            }
            CastMethod::FromExile => {
                instance.zone == Zone::Exile
                    && (instance.foretold
                        || (instance.suspended && instance.counter(CounterKind::Time) == 0)
                        || self.players[player].exile.contains(&card))
            }
            CastMethod::Miracle => {
                instance.zone == Zone::Hand && self.last_drawn[player] == Some(card)
            }
            _ => instance.zone == Zone::Hand,
        }
    }

    /// The mana cost a method casts for (base component only; riders
    /// are added at commit).
    #[must_use]
    pub fn cast_cost(
        &self,
        card_id: CardId,
        method: CastMethod,
        extras: &CastExtras,
    ) -> Option<ManaCost> {
        let data = self.registry.get(card_id)?;
        let keyword_for = |kw: Keyword| data.keyword_cost(kw);

        Some(match method {
            CastMethod::Normal | CastMethod::Impending | CastMethod::FromExile => {
                match method {
                    CastMethod::Impending => keyword_for(Keyword::Impending)?,
                    CastMethod::FromExile if data.has_keyword(Keyword::Foretell) => {
                        keyword_for(Keyword::Foretell)?
                    }
                    CastMethod::FromExile if data.has_keyword(Keyword::Suspend) => ManaCost::free(),
                    _ => data.mana_cost,
                }
            }
            CastMethod::MdfcBack => data.back_face()?.mana_cost,
            CastMethod::Adventure => data.adventure_face()?.mana_cost,
            CastMethod::LeftHalf => data.split_halves()?.0.mana_cost,
            CastMethod::RightHalf | CastMethod::Aftermath => data.split_halves()?.1.mana_cost,
            CastMethod::Fuse => {
                let (left, right) = data.split_halves()?;
                let mut cost = left.mana_cost;
                cost.generic = cost.generic.saturating_add(right.mana_cost.generic);
                for color in crate::core::Color::ALL {
                    cost = cost.with_pips(color, right.mana_cost.pips(color));
                }
                cost
            }
            CastMethod::Delve => {
                let n = extras.exile_from_graveyard.len() as u8;
                data.mana_cost.reduced_generic(n)
            }
            CastMethod::Emerge => {
                let base = keyword_for(Keyword::Emerge)?;
                let discount = extras
                    .sacrifice
                    .and_then(|c| self.card_data(c))
                    .map_or(0, |d| d.cmc() as u8);
                base.reduced_generic(discount)
            }
            CastMethod::Flashback => keyword_for(Keyword::Flashback)?,
            CastMethod::JumpStart => data.mana_cost,
            CastMethod::Escape => keyword_for(Keyword::Escape)?,
            CastMethod::Madness => keyword_for(Keyword::Madness)?,
            CastMethod::Overload => keyword_for(Keyword::Overload)?,
            CastMethod::Disturb => keyword_for(Keyword::Disturb)?,
            CastMethod::Dash => keyword_for(Keyword::Dash)?,
            CastMethod::Spectacle => keyword_for(Keyword::Spectacle)?,
            CastMethod::Bestow => keyword_for(Keyword::Bestow)?,
            CastMethod::Blitz => keyword_for(Keyword::Blitz)?,
            CastMethod::Eternalize => keyword_for(Keyword::Eternalize)?,
            CastMethod::Embalm => keyword_for(Keyword::Embalm)?,
            CastMethod::Reinforce => keyword_for(Keyword::Reinforce)?,
            CastMethod::Channel => keyword_for(Keyword::Channel)?,
            CastMethod::Transmute => keyword_for(Keyword::Transmute)?,
            CastMethod::Forecast => keyword_for(Keyword::Forecast)?,
            CastMethod::Suspend => keyword_for(Keyword::Suspend)?,
            CastMethod::Unearth => keyword_for(Keyword::Unearth)?,
            CastMethod::Encore => keyword_for(Keyword::Encore)?,
            CastMethod::Evoke => keyword_for(Keyword::Evoke)?,
            CastMethod::Miracle => keyword_for(Keyword::Miracle)?,
            CastMethod::Foretell => ManaCost::generic(2),
        })
    }

    /// Perform the non-mana portion of a method's cost.
    fn pay_cast_extras(
        &mut self,
        handler: &dyn AbilityHandler,
        player: PlayerId,
        method: CastMethod,
        extras: &CastExtras,
    ) -> bool {
        match method {
            CastMethod::JumpStart => {
                let Some(idx) = extras.discard_hand_idx else {
                    return false;
                };
                let Some(card) = self.hand_card(player, idx) else {
                    return false;
                };
                self.discard(handler, player, card).is_ok()
            }
            CastMethod::Escape | CastMethod::Delve => {
                if method == CastMethod::Escape && extras.exile_from_graveyard.is_empty() {
                    return false;
                }
                for &card in &extras.exile_from_graveyard {
                    if self
                        .move_card(handler, card, Zone::Exile, ZonePlacement::Top, None)
                        .is_err()
                    {
                        return false;
                    }
                }
                true
            }
            CastMethod::Emerge => {
                let Some(sacrifice) = extras.sacrifice else {
                    return false;
                };
                if !self.is_creature(sacrifice) {
                    return false;
                }
                let card_id = match self.instance(sacrifice) {
                    Some(i) => i.card_id,
                    None => return false,
                };
                if self
                    .move_card(handler, sacrifice, Zone::Graveyard, ZonePlacement::Top, None)
                    .is_err()
                {
                    return false;
                }
                self.fire_event(
                    handler,
                    GameEvent::Sacrificed {
                        card_id,
                        controller: player,
                    },
                );
                true
            }
            CastMethod::Spectacle => self.life_lost_this_turn[player.opponent()] > 0,
            _ => true,
        }
    }

    // === Exile-parking mechanics ===

    /// Foretell: exile face-down for {2}, castable later for the
    /// foretell cost.
    pub fn foretell(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
        player: PlayerId,
        card: CardHandle,
    ) -> bool {
        if !self.players[player].hand.contains(&card) {
            return false;
        }
        if !self
            .card_data(card)
            .is_some_and(|d| d.has_keyword(Keyword::Foretell))
        {
            return false;
        }
        if mana.pay(self, player, &ManaCost::generic(2), 0).is_err() {
            return false;
        }
        let Ok(in_exile) = self.move_card(handler, card, Zone::Exile, ZonePlacement::Top, None)
        else {
            return false;
        };
        if let Some(instance) = self.store.get_mut(in_exile) {
            instance.face_down = true;
            instance.foretold = true;
        }
        true
    }

    /// Suspend: exile with time counters; cast free when they run out.
    pub fn suspend(
        &mut self,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
        player: PlayerId,
        card: CardHandle,
    ) -> bool {
        let Some(cost) = self
            .card_data(card)
            .and_then(|d| d.keyword_cost(Keyword::Suspend))
        else {
            return false;
        };
        if !self.players[player].hand.contains(&card) {
            return false;
        }
        if mana.pay(self, player, &cost, 0).is_err() {
            return false;
        }
        let Ok(in_exile) = self.move_card(handler, card, Zone::Exile, ZonePlacement::Top, None)
        else {
            return false;
        };
        if let Some(instance) = self.store.get_mut(in_exile) {
            instance.suspended = true;
            instance.add_counters(CounterKind::Time, SUSPEND_COUNTERS);
        }
        true
    }

    /// Cards in a player's exile that are currently castable.
    #[must_use]
    pub fn castable_from_exile(&self, player: PlayerId) -> Vec<CardHandle> {
        self.players[player]
            .exile
            .iter()
            .copied()
            .filter(|&card| {
                let Some(instance) = self.instance(card) else {
                    return false;
                };
                if instance.foretold {
                    return true;
                }
                if instance.suspended && instance.counter(CounterKind::Time) == 0 {
                    return true;
                }
                // Adventure creatures exiled after the adventure half.
                self.registry
                    .get(instance.card_id)
                    .is_some_and(|d| d.layout == CardLayout::Adventure)
            })
            .collect()
    }

    /// Whether a card's printed types allow casting at instant speed.
    #[must_use]
    pub fn is_instant_speed(&self, card_id: CardId, method: CastMethod) -> bool {
        let Some(data) = self.registry.get(card_id) else {
            return false;
        };
        if data.has_keyword(Keyword::Flash) {
            return true;
        }
        self.cast_face_types_pub(card_id, method)
            .is_some_and(|t| t.has_type(crate::cards::CardType::Instant))
    }

    fn cast_face_types_pub(&self, card_id: CardId, method: CastMethod) -> Option<&TypeLine> {
        self.cast_face_types(card_id, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardData, CardRegistry, CardType};
    use crate::core::{Color, PlayerPair};
    use crate::game::GameConfig;
    use crate::rules::{BasicAbilityHandler, PoolManaSystem};

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(CardData::new(
            CardId::new(1),
            "Mountain",
            TypeLine::of(CardType::Land).with_subtype("Mountain"),
        ));
        r.register(
            CardData::new(CardId::new(2), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::free())
                .with_stats(2, 2),
        );
        r.register(
            CardData::new(
                CardId::new(3),
                "Deep Analysis",
                TypeLine::of(CardType::Sorcery),
            )
            .with_cost(ManaCost::free())
            .with_keyword_cost(Keyword::Flashback, ManaCost::free()),
        );
        r.register(
            CardData::new(
                CardId::new(4),
                "Burst Lightning",
                TypeLine::of(CardType::Instant),
            )
            .with_cost(ManaCost::free())
            .with_keyword_cost(Keyword::Kicker, ManaCost::generic(4)),
        );
        r
    }

    fn game() -> (Game, BasicAbilityHandler, PoolManaSystem) {
        let deck: Vec<CardId> = (0..20).map(|i| CardId::new(i % 4 + 1)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            17,
        );
        game.phase = Phase::MainPre;
        game.assign_priority(PlayerId::P1);
        (game, BasicAbilityHandler::new(), PoolManaSystem::new())
    }

    /// Pin a known card into a hand slot.
    fn pin(game: &mut Game, player: PlayerId, idx: usize, id: u32) -> CardHandle {
        let handle = game.players[player].hand[idx];
        game.store.get_mut(handle).unwrap().card_id = CardId::new(id);
        handle
    }

    #[test]
    fn test_play_land_once_per_turn() {
        let (mut game, handler, _) = game();
        let land = pin(&mut game, PlayerId::P1, 0, 1);
        let second = pin(&mut game, PlayerId::P1, 1, 1);

        assert!(game.play_land(&handler, PlayerId::P1, land, false));
        assert!(game.players[PlayerId::P1].land_played);
        assert_eq!(game.players[PlayerId::P1].battlefield.len(), 1);

        assert!(!game.play_land(&handler, PlayerId::P1, second, false));
    }

    #[test]
    fn test_free_creature_commits_to_stack() {
        let (mut game, handler, mana) = game();
        let bear = pin(&mut game, PlayerId::P1, 0, 2);

        assert!(game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            bear,
            CastMethod::Normal,
            &CastExtras::default()
        ));

        assert!(game.pending_spell.is_none());
        assert_eq!(game.stack.len(), 1);
        assert_eq!(game.phase, Phase::Priority);
        assert_eq!(game.priority, Some(PlayerId::P1));
    }

    #[test]
    fn test_kicker_decision_gates_commit() {
        let (mut game, handler, mana) = game();
        let spell = pin(&mut game, PlayerId::P1, 0, 4);

        assert!(game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            spell,
            CastMethod::Normal,
            &CastExtras::default()
        ));
        // Parked pending the kicker decision.
        assert!(game.pending_spell.is_some());
        assert!(game.pending_decisions_outstanding());
        assert!(game.stack.is_empty());

        // Cannot afford the kicker: paying is refused, declining works.
        assert!(!game.pending_pay_kicker(&mana, true));
        assert!(game.pending_pay_kicker(&mana, false));
        assert!(game.advance_pending_cast(&handler, &mana));

        assert!(game.pending_spell.is_none());
        assert_eq!(game.stack.len(), 1);
        assert!(!game.stack.top().unwrap().context.kicked);
    }

    #[test]
    fn test_flashback_from_graveyard_exiles_after() {
        let (mut game, handler, mana) = game();
        let spell = pin(&mut game, PlayerId::P1, 0, 3);
        let spell = game
            .move_card(&handler, spell, Zone::Graveyard, ZonePlacement::Top, None)
            .unwrap();

        assert!(game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            spell,
            CastMethod::Flashback,
            &CastExtras::default()
        ));
        assert_eq!(game.stack.len(), 1);

        game.resolve_top_of_stack(&handler);
        assert_eq!(game.players[PlayerId::P1].exile.len(), 1);
        assert!(game.players[PlayerId::P1].graveyard.is_empty());
    }

    #[test]
    fn test_flashback_requires_graveyard() {
        let (mut game, handler, mana) = game();
        let spell = pin(&mut game, PlayerId::P1, 0, 3);

        // Still in hand: flashback refused.
        assert!(!game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            spell,
            CastMethod::Flashback,
            &CastExtras::default()
        ));
    }

    #[test]
    fn test_spectacle_needs_life_loss() {
        let (mut game, handler, mana) = game();
        let mut r = registry();
        r.register(
            CardData::new(
                CardId::new(5),
                "Light Up the Stage",
                TypeLine::of(CardType::Sorcery),
            )
            .with_cost(ManaCost::generic(2).with_pips(Color::Red, 1))
            .with_keyword_cost(Keyword::Spectacle, ManaCost::free()),
        );
        game.registry = r;
        let card = pin(&mut game, PlayerId::P1, 0, 5);

        assert!(!game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            card,
            CastMethod::Spectacle,
            &CastExtras::default()
        ));

        game.life_lost_this_turn[PlayerId::P2] = 2;
        assert!(game.begin_cast(
            &handler,
            &mana,
            PlayerId::P1,
            card,
            CastMethod::Spectacle,
            &CastExtras::default()
        ));
    }

    #[test]
    fn test_foretell_parks_in_exile() {
        let (mut game, handler, mana) = game();
        let mut r = registry();
        r.register(
            CardData::new(
                CardId::new(6),
                "Behold the Multiverse",
                TypeLine::of(CardType::Instant),
            )
            .with_cost(ManaCost::generic(3))
            .with_keyword(Keyword::Foretell)
            .with_keyword_cost(Keyword::Foretell, ManaCost::generic(1)),
        );
        game.registry = r;
        let card = pin(&mut game, PlayerId::P1, 0, 6);
        game.players[PlayerId::P1].pool.add_colorless();
        game.players[PlayerId::P1].pool.add_colorless();

        assert!(game.foretell(&handler, &mana, PlayerId::P1, card));
        assert_eq!(game.players[PlayerId::P1].exile.len(), 1);

        let parked = game.players[PlayerId::P1].exile[0];
        assert!(game.instance(parked).unwrap().foretold);
        assert_eq!(game.castable_from_exile(PlayerId::P1), vec![parked]);
    }
}
