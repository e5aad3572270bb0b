//! The action-mask generator.
//!
//! A pure function of observable state: given a perspective player, it
//! walks the decision hierarchy the dispatcher enforces (game over,
//! mulligans, choice sub-protocols, effect grants, pending-spell
//! decisions, cleanup discards, then ordinary priority) and emits the
//! legal action indices with reasons and required-context shapes.

use crate::cards::{CardLayout, CounterKind, Keyword};
use crate::casting::CastExtras;
use crate::choices::ChoiceKind;
use crate::core::{CardHandle, Phase, PlayerId, Zone};
use crate::game::{EffectGrant, Game};
use crate::mulligan::MulliganState;
use crate::rules::{AbilityHandler, ManaSystem, ResponseRole};
use crate::stack::CastMethod;

use super::context::ActionContext;
use super::mask::ActionMask;
use super::vocab::*;

/// Computes the 480-bit mask. Stateless; everything is a function of
/// the game value and the collaborators.
pub struct ActionMaskGenerator;

impl ActionMaskGenerator {
    /// Generate the mask for one perspective player.
    #[must_use]
    pub fn generate(
        game: &Game,
        handler: &dyn AbilityHandler,
        mana: &dyn ManaSystem,
        perspective: PlayerId,
    ) -> ActionMask {
        let mut builder = Builder {
            game,
            handler,
            mana,
            perspective,
            mask: ActionMask::new(),
        };
        builder.run();
        builder.mask
    }
}

struct Builder<'a> {
    game: &'a Game,
    handler: &'a dyn AbilityHandler,
    mana: &'a dyn ManaSystem,
    perspective: PlayerId,
    mask: ActionMask,
}

impl Builder<'_> {
    fn run(&mut self) {
        let game = self.game;

        if game.is_over() {
            self.mask.allow(A_NO_OP, "game over");
            return;
        }
        if game.error_flagged {
            self.mask.allow(A_PASS_PRIORITY, "error recovery");
            self.mask.allow(A_CONCEDE, "error recovery");
            return;
        }
        if !game.mulligans_complete() {
            self.mulligan_actions();
            return;
        }
        if game.in_choice_flow() {
            self.choice_actions();
            return;
        }
        if let Some(grant) = game.current_grant() {
            self.grant_actions(grant);
            return;
        }
        if game.pending_spell.is_some() && game.pending_decisions_outstanding() {
            self.pending_spell_actions();
            return;
        }
        if self.cleanup_discard_actions() {
            return;
        }

        // Ordinary priority.
        if game.priority != Some(self.perspective) {
            self.mask.allow(A_NO_OP, "waiting for priority");
            self.mana_abilities();
            return;
        }

        self.mask.allow(A_PASS_PRIORITY, "holds priority");

        if game.stack.split_second_active() {
            self.mana_abilities();
            return;
        }

        self.mana_abilities();
        self.dredge_offer();
        self.instant_speed_actions();
        self.sorcery_speed_actions();
        self.combat_actions();
        self.phase_controls();

        if self.mask.count() == 0 {
            self.mask.allow(A_CONCEDE, "no other legal action");
        }
    }

    // === Decision-hierarchy branches ===

    fn mulligan_actions(&mut self) {
        let game = self.game;
        match game.mulligan[self.perspective] {
            MulliganState::Bottoming { remaining } => {
                let hand = game.players[self.perspective].hand.len();
                for idx in 0..hand.min(4) {
                    self.mask.allow_with(
                        A_BOTTOM_BASE + idx as u16,
                        format!("bottom {remaining} more"),
                        ActionContext::None,
                    );
                }
            }
            MulliganState::Deciding => {
                self.mask.allow(A_KEEP_HAND, "keep this hand");
                if game.players[self.perspective].mulligans < 7 {
                    self.mask.allow(A_MULLIGAN, "mulligan again");
                }
            }
            MulliganState::Done => {
                self.mask.allow(A_NO_OP, "waiting on opponent's mulligan");
            }
        }
    }

    fn choice_actions(&mut self) {
        let game = self.game;
        if game.choice_controller() != Some(self.perspective) {
            self.mask.allow(A_NO_OP, "opponent is choosing");
            return;
        }

        if let Some(ctx) = &game.targeting {
            let candidates = game.current_target_candidates(self.handler);
            for (i, target) in candidates.iter().enumerate() {
                self.mask.allow_with(
                    A_SELECT_TARGET_BASE + i as u16,
                    format!("target {target:?}"),
                    ActionContext::None,
                );
            }
            if ctx.selected.len() >= ctx.requirement.min as usize {
                self.mask.allow(A_PASS_PRIORITY, "finalise targets");
            }
            if self.mask.is_empty() {
                // No candidate and minimum unmet: the spell will fizzle.
                self.mask.allow(A_PASS_PRIORITY, "no legal targets");
            }
            return;
        }

        if game.sacrifice.is_some() {
            let candidates = game.current_sacrifice_candidates();
            for (i, card) in candidates.iter().enumerate() {
                self.mask.allow_with(
                    A_SACRIFICE_BASE + i as u16,
                    format!("sacrifice {card}"),
                    ActionContext::None,
                );
            }
            if self.mask.is_empty() {
                self.mask.allow(A_CONCEDE, "cannot satisfy sacrifice");
            }
            return;
        }

        let Some(choice) = &game.choice else { return };
        match &choice.kind {
            ChoiceKind::Mode {
                available,
                min,
                selected,
                ..
            } => {
                for mode in 0..*available {
                    if !selected.contains(&mode) {
                        self.mask
                            .allow(A_CHOOSE_MODE_BASE + u16::from(mode), "choose mode");
                    }
                }
                if selected.len() >= *min as usize {
                    self.mask.allow(A_PASS_PRIORITY, "finalise modes");
                }
            }
            ChoiceKind::XValue => {
                for x in 1..=10u32 {
                    if self.mana.can_pay(
                        game,
                        self.perspective,
                        &crate::core::ManaCost::free(),
                        x,
                    ) {
                        self.mask
                            .allow(A_CHOOSE_X_BASE + (x as u16 - 1), format!("X = {x}"));
                    }
                }
                // X = 0 is expressed by passing.
                self.mask.allow(A_PASS_PRIORITY, "X = 0");
            }
            ChoiceKind::Color => {
                for i in 0..5u16 {
                    self.mask.allow(A_CHOOSE_COLOR_BASE + i, "choose colour");
                }
            }
            ChoiceKind::Scry { .. } => {
                self.mask.allow(A_PUT_ON_TOP, "keep on top");
                self.mask.allow(A_PUT_ON_BOTTOM, "put on bottom");
            }
            ChoiceKind::Surveil { .. } => {
                self.mask.allow(A_PUT_ON_TOP, "keep on top");
                self.mask.allow(A_PUT_TO_GRAVEYARD, "into graveyard");
            }
        }
    }

    fn grant_actions(&mut self, grant: &EffectGrant) {
        let game = self.game;
        if grant.player() != self.perspective {
            self.mask.allow(A_NO_OP, "opponent resolving effect");
            return;
        }

        match grant {
            EffectGrant::CreateToken { .. } => {
                for i in 0..5u16 {
                    self.mask.allow(A_CREATE_TOKEN_BASE + i, "create token");
                }
            }
            EffectGrant::CopyPermanent { .. } => {
                self.mask.allow_with(
                    A_COPY_PERMANENT,
                    "copy a permanent",
                    ActionContext::CopyPermanent { target_idx: 0 },
                );
            }
            EffectGrant::CopySpell { .. } => {
                if !game.stack.is_empty() {
                    self.mask.allow_with(
                        A_COPY_SPELL,
                        "copy a spell",
                        ActionContext::Spell { stack_idx: 0 },
                    );
                } else {
                    self.mask.allow(A_NO_OP, "nothing to copy");
                }
            }
            EffectGrant::Populate { .. } => {
                let has_token = game.players[self.perspective]
                    .battlefield
                    .iter()
                    .any(|&c| game.instance(c).is_some_and(|i| i.is_token));
                if has_token {
                    self.mask.allow(A_POPULATE, "populate");
                } else {
                    self.mask.allow(A_NO_OP, "no token to populate");
                }
            }
            EffectGrant::SearchLibrary { .. } => {
                for i in 0..5u16 {
                    self.mask.allow(A_SEARCH_BASE + i, "search category");
                }
                self.mask.allow(A_SEARCH_FAIL, "decline search");
            }
            EffectGrant::ReturnFromGraveyard { .. } => {
                self.zone_indexed(A_RETURN_GY_BASE, GRAVEYARD_SLOTS, "return to hand", Zone::Graveyard);
            }
            EffectGrant::Reanimate { .. } => {
                let creatures: Vec<u16> = game.players[self.perspective]
                    .graveyard
                    .iter()
                    .take(GRAVEYARD_SLOTS)
                    .enumerate()
                    .filter(|(_, &c)| {
                        game.card_data(c).is_some_and(|d| d.is_creature())
                    })
                    .map(|(i, _)| i as u16)
                    .collect();
                for i in creatures {
                    self.mask.allow(A_REANIMATE_BASE + i, "reanimate");
                }
                if self.mask.is_empty() {
                    self.mask.allow(A_NO_OP, "no creature to reanimate");
                }
            }
            EffectGrant::ReturnFromExile { .. } => {
                self.zone_indexed(A_RETURN_EXILE_BASE, 6, "return from exile", Zone::Exile);
            }
            EffectGrant::AddCounter { kind, .. } => {
                for (i, _) in self.counter_targets().iter().enumerate() {
                    self.mask.allow_with(
                        A_ADD_COUNTER_BASE + i as u16,
                        "add counter",
                        ActionContext::Counter { kind: *kind },
                    );
                }
            }
            EffectGrant::RemoveCounter { .. } => {
                let targets = self.counter_targets();
                for (i, &card) in targets.iter().enumerate() {
                    if game.instance(card).is_some_and(|c| c.has_any_counter()) {
                        self.mask.allow_with(
                            A_REMOVE_COUNTER_BASE + i as u16,
                            "remove counter",
                            ActionContext::Counter {
                                kind: CounterKind::PlusOnePlusOne,
                            },
                        );
                    }
                }
                if self.mask.is_empty() {
                    self.mask.allow(A_NO_OP, "no counters to remove");
                }
            }
            EffectGrant::Proliferate { .. } => {
                self.mask.allow(A_PROLIFERATE, "proliferate");
            }
            EffectGrant::Clash { .. } => {
                self.mask.allow(457, "clash");
            }
            EffectGrant::Discard { .. } => {
                let hand = game.players[self.perspective].hand.len();
                for i in 0..hand.min(10) {
                    self.mask
                        .allow(A_DISCARD_BASE + i as u16, "discard to effect");
                }
            }
        }

        if self.mask.is_empty() {
            // Nothing to act on: a NO_OP consumes the grant.
            self.mask.allow(A_NO_OP, "grant has no legal object");
        }
    }

    fn pending_spell_actions(&mut self) {
        let game = self.game;
        let Some(pending) = &game.pending_spell else {
            return;
        };
        if pending.controller != self.perspective {
            self.mask.allow(A_NO_OP, "opponent finishing a cast");
            return;
        }
        let Some(data) = game.registry.get(pending.card_id) else {
            return;
        };

        if data.has_keyword(Keyword::Kicker) && !pending.kicker_decided {
            if let Some(kicker) = data.keyword_cost(Keyword::Kicker) {
                let mut total = pending.base_cost;
                total.generic = total.generic.saturating_add(kicker.generic);
                if self.mana.can_pay(game, self.perspective, &total, 0) {
                    self.mask.allow(A_PAY_KICKER_YES, "pay kicker");
                }
            }
            self.mask.allow(A_PAY_KICKER_NO, "decline kicker");
        }
        if data.additional_sacrifice.is_some() && !pending.additional_decided {
            self.mask.allow(A_PAY_ADDITIONAL_YES, "pay additional cost");
            self.mask.allow(A_PAY_ADDITIONAL_NO, "decline additional cost");
        }
        if data.has_keyword(Keyword::Escalate) {
            self.mask.allow_with(
                A_PAY_ESCALATE,
                "escalate extra modes",
                ActionContext::Escalate { extra_modes: 1 },
            );
        }
        if data.has_keyword(Keyword::Offspring) && !pending.context.offspring {
            self.mask.allow(A_PAY_OFFSPRING, "pay offspring");
        }
        if data.has_keyword(Keyword::Spree) {
            let available = data.modes.map_or(2, |m| m.available).min(2);
            if let Some(hand_idx) = game.players[self.perspective]
                .hand
                .iter()
                .position(|&h| h == pending.card)
            {
                for mode in 0..available {
                    if !pending.context.modes.contains(&mode) {
                        let slot = (hand_idx.min(HAND_SLOTS - 1) * 2) as u16 + u16::from(mode);
                        self.mask.allow(258 + slot, "select spree mode");
                    }
                }
            }
        }
    }

    /// Cleanup discard: returns true when it owns the decision.
    fn cleanup_discard_actions(&mut self) -> bool {
        let game = self.game;
        if game.phase != Phase::Cleanup {
            return false;
        }
        let excess = game.players[game.active]
            .hand
            .len()
            .saturating_sub(game.max_hand_size);
        if excess == 0 {
            return false;
        }
        if self.perspective != game.active {
            self.mask.allow(A_NO_OP, "opponent discarding");
            return true;
        }
        let hand = game.players[game.active].hand.len();
        for i in 0..hand.min(10) {
            self.mask
                .allow(A_DISCARD_BASE + i as u16, format!("discard {excess} more"));
        }
        true
    }

    // === Priority-holder action groups ===

    fn mana_abilities(&mut self) {
        let game = self.game;
        let p = &game.players[self.perspective];
        for (idx, &card) in p.battlefield.iter().take(BATTLEFIELD_SLOTS).enumerate() {
            if p.is_tapped(card) {
                continue;
            }
            let Some(data) = game.card_data(card) else {
                continue;
            };
            let has_mana_ability = data.abilities.iter().any(|a| a.is_mana_ability());
            if !has_mana_ability {
                continue;
            }
            if data.is_creature() && p.is_summoning_sick(card) {
                continue;
            }
            self.mask
                .allow(68 + idx as u16, "tap for mana");
        }
    }

    fn dredge_offer(&mut self) {
        let game = self.game;
        if game.phase != Phase::Draw || !game.dredge_pending || game.active != self.perspective {
            return;
        }
        for (idx, &card) in game.players[self.perspective]
            .graveyard
            .iter()
            .take(GRAVEYARD_SLOTS)
            .enumerate()
        {
            let dredgeable = game
                .card_data(card)
                .and_then(|d| d.keyword_cost(Keyword::Dredge))
                .is_some_and(|c| {
                    game.players[self.perspective].library.len() >= c.generic as usize
                });
            if dredgeable {
                self.mask.allow_with(
                    A_DREDGE,
                    "dredge instead of drawing",
                    ActionContext::Graveyard { graveyard_idx: idx },
                );
            }
        }
    }

    fn instant_speed_actions(&mut self) {
        let game = self.game;
        if !game.phase.is_interactive() {
            return;
        }
        let me = self.perspective;

        // Instant-speed casts from hand.
        if game.pending_spell.is_none() {
            for (idx, &card) in game.players[me].hand.iter().take(HAND_SLOTS).enumerate() {
                let Some(instance) = game.instance(card) else {
                    continue;
                };
                let Some(data) = game.registry.get(instance.card_id) else {
                    continue;
                };
                if data.is_land() {
                    continue;
                }
                if !game.is_instant_speed(instance.card_id, CastMethod::Normal) {
                    continue;
                }
                if self.affordable(instance.card_id, CastMethod::Normal) {
                    self.mask
                        .allow(20 + idx as u16, format!("cast {}", data.name));
                }
            }
            self.response_actions();
            self.grave_cast_actions(false);
            self.alt_mechanic_actions(false);
            self.exile_cast_actions();
            self.split_cast_actions(false);
        }

        // Non-mana activated abilities.
        self.activated_abilities();

        // Turning face-down cards face up is a special action.
        self.face_up_actions();
    }

    fn sorcery_speed_actions(&mut self) {
        let game = self.game;
        let me = self.perspective;
        if !self.sorcery_ok() || game.pending_spell.is_some() {
            return;
        }

        // Land drops.
        if !game.players[me].land_played {
            for (idx, &card) in game.players[me]
                .hand
                .iter()
                .take(HAND_LAND_SLOTS)
                .enumerate()
            {
                let Some(data) = game.card_data(card) else {
                    continue;
                };
                if data.is_land() {
                    self.mask.allow(13 + idx as u16, "play land");
                }
                if data.back_face().is_some_and(|f| f.types.is_land()) {
                    self.mask.allow(180 + idx as u16, "play MDFC land back");
                }
            }
        }

        // Sorcery-speed casts.
        for (idx, &card) in game.players[me].hand.iter().take(HAND_SLOTS).enumerate() {
            let Some(instance) = game.instance(card) else {
                continue;
            };
            let card_id = instance.card_id;
            let Some(data) = game.registry.get(card_id) else {
                continue;
            };
            if data.is_land() {
                continue;
            }
            if !game.is_instant_speed(card_id, CastMethod::Normal)
                && self.affordable(card_id, CastMethod::Normal)
            {
                self.mask
                    .allow(20 + idx as u16, format!("cast {}", data.name));
            }
            // Non-land MDFC backs.
            if data.layout == CardLayout::Mdfc
                && data.back_face().is_some_and(|f| !f.types.is_land())
                && self.affordable(card_id, CastMethod::MdfcBack)
            {
                self.mask.allow(188 + idx as u16, "cast MDFC back face");
            }
            // Adventures.
            if data.adventure_face().is_some() && self.affordable(card_id, CastMethod::Adventure) {
                self.mask.allow(196 + idx as u16, "cast adventure half");
            }
            // Impending.
            if data.has_keyword(Keyword::Impending) && self.affordable(card_id, CastMethod::Impending)
            {
                self.mask.allow_with(
                    A_CAST_FOR_IMPENDING,
                    "cast for impending",
                    ActionContext::Hand { hand_idx: idx },
                );
            }
        }

        self.grave_cast_actions(true);
        self.alt_mechanic_actions(true);
        self.split_cast_actions(true);
        self.battlefield_special_actions();
        self.loyalty_actions();
        self.mechanic_actions();
    }

    fn response_actions(&mut self) {
        let game = self.game;
        if game.stack.is_empty() {
            return;
        }
        let has_spell = game.stack.items().iter().any(|i| i.is_spell());
        let has_ability = game.stack.items().iter().any(|i| !i.is_spell());
        let has_trigger = game.stack.items().iter().any(|i| i.is_trigger());

        for (idx, &card) in game.players[self.perspective]
            .hand
            .iter()
            .take(HAND_SLOTS)
            .enumerate()
        {
            let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                continue;
            };
            let Some(role) = self.handler.response_role(game, card_id) else {
                continue;
            };
            if !self.affordable(card_id, CastMethod::Normal) {
                continue;
            }
            let offset = match role {
                ResponseRole::CounterSpell if has_spell => 0,
                ResponseRole::CounterAbility if has_ability => 1,
                ResponseRole::PreventDamage { .. } => 2,
                ResponseRole::RedirectDamage => 3,
                ResponseRole::Stifle if has_trigger => 4,
                _ => continue,
            };
            self.mask.allow_with(
                A_RESPONSE_BASE + offset,
                format!("response {role:?}"),
                ActionContext::Response {
                    hand_idx: idx,
                    target_stack_idx: game.stack.len().saturating_sub(1),
                },
            );
        }
    }

    fn grave_cast_actions(&mut self, sorcery: bool) {
        let game = self.game;
        let me = self.perspective;

        for (slot, method) in [
            (0u16, CastMethod::Flashback),
            (1, CastMethod::JumpStart),
            (2, CastMethod::Escape),
            (4, CastMethod::Overload),
            (5, CastMethod::Emerge),
            (6, CastMethod::Delve),
        ] {
            let keyword = match method {
                CastMethod::Flashback => Keyword::Flashback,
                CastMethod::JumpStart => Keyword::JumpStart,
                CastMethod::Escape => Keyword::Escape,
                CastMethod::Overload => Keyword::Overload,
                CastMethod::Emerge => Keyword::Emerge,
                _ => Keyword::Delve,
            };
            let zone: &[CardHandle] = if method.casts_from_graveyard() {
                &game.players[me].graveyard
            } else {
                &game.players[me].hand
            };
            for (idx, &card) in zone.iter().take(GRAVEYARD_SLOTS.max(HAND_SLOTS)).enumerate() {
                let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                    continue;
                };
                let Some(data) = game.registry.get(card_id) else {
                    continue;
                };
                if !data.has_keyword(keyword) {
                    continue;
                }
                if game.is_instant_speed(card_id, method) != !sorcery {
                    continue;
                }
                if !self.affordable(card_id, method) {
                    continue;
                }
                let context = if method.casts_from_graveyard() {
                    ActionContext::Graveyard { graveyard_idx: idx }
                } else {
                    ActionContext::Hand { hand_idx: idx }
                };
                self.mask.allow_with(
                    A_GRAVE_CAST_BASE + slot,
                    format!("{method:?} {}", data.name),
                    context,
                );
            }
        }

        // Madness rides the window, not a zone scan; the window is an
        // instant-speed opportunity.
        if !sorcery {
            if let Some(card) = game.madness_window {
                if game.instance(card).map(|i| i.owner) == Some(me) {
                    if let Some(card_id) = game.instance(card).map(|i| i.card_id) {
                        if self.affordable(card_id, CastMethod::Madness) {
                            self.mask.allow(A_GRAVE_CAST_BASE + 3, "cast for madness");
                        }
                    }
                }
            }
        }
    }

    fn alt_mechanic_actions(&mut self, sorcery: bool) {
        let game = self.game;
        let me = self.perspective;

        for (slot, mechanic) in AltMechanic::ALL.iter().enumerate() {
            let (keyword, method) = match mechanic {
                AltMechanic::Disturb => (Keyword::Disturb, CastMethod::Disturb),
                AltMechanic::Dash => (Keyword::Dash, CastMethod::Dash),
                AltMechanic::Spectacle => (Keyword::Spectacle, CastMethod::Spectacle),
                AltMechanic::Bestow => (Keyword::Bestow, CastMethod::Bestow),
                AltMechanic::Blitz => (Keyword::Blitz, CastMethod::Blitz),
                AltMechanic::Eternalize => (Keyword::Eternalize, CastMethod::Eternalize),
                AltMechanic::Embalm => (Keyword::Embalm, CastMethod::Embalm),
                AltMechanic::Reinforce => (Keyword::Reinforce, CastMethod::Reinforce),
                AltMechanic::Channel => (Keyword::Channel, CastMethod::Channel),
                AltMechanic::Transmute => (Keyword::Transmute, CastMethod::Transmute),
                AltMechanic::Forecast => (Keyword::Forecast, CastMethod::Forecast),
                AltMechanic::Suspend => (Keyword::Suspend, CastMethod::Suspend),
                AltMechanic::Unearth => (Keyword::Unearth, CastMethod::Unearth),
                AltMechanic::Encore => (Keyword::Encore, CastMethod::Encore),
                AltMechanic::Partner => (Keyword::Partner, CastMethod::FromExile),
                AltMechanic::Companion => (Keyword::Companion, CastMethod::FromExile),
                AltMechanic::Evoke => (Keyword::Evoke, CastMethod::Evoke),
                AltMechanic::Miracle => (Keyword::Miracle, CastMethod::Miracle),
                AltMechanic::Foretell => (Keyword::Foretell, CastMethod::Foretell),
            };

            // Forecast is upkeep-only; most others are sorcery-speed.
            let timing_ok = match mechanic {
                AltMechanic::Forecast => {
                    game.phase == Phase::Upkeep && game.active == me && !sorcery
                }
                AltMechanic::Miracle | AltMechanic::Reinforce | AltMechanic::Channel => !sorcery,
                _ => sorcery,
            };
            if !timing_ok {
                continue;
            }

            let zone: &[CardHandle] = match mechanic {
                AltMechanic::Disturb
                | AltMechanic::Eternalize
                | AltMechanic::Embalm
                | AltMechanic::Unearth
                | AltMechanic::Encore => &game.players[me].graveyard,
                AltMechanic::Partner | AltMechanic::Companion => &game.players[me].exile,
                _ => &game.players[me].hand,
            };

            for (idx, &card) in zone.iter().take(HAND_SLOTS).enumerate() {
                let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                    continue;
                };
                let Some(data) = game.registry.get(card_id) else {
                    continue;
                };
                if !data.has_keyword(keyword) {
                    continue;
                }
                let affordable = match mechanic {
                    AltMechanic::Foretell => self.can_pay_plain(2),
                    AltMechanic::Partner | AltMechanic::Companion => self.can_pay_plain(3),
                    AltMechanic::Miracle => {
                        game.last_drawn[me] == Some(card) && self.affordable(card_id, method)
                    }
                    _ => self.affordable(card_id, method),
                };
                if !affordable {
                    continue;
                }
                let context = match zone_kind(mechanic) {
                    ZoneKind::Graveyard => ActionContext::Graveyard { graveyard_idx: idx },
                    _ => ActionContext::Hand { hand_idx: idx },
                };
                self.mask.allow_with(
                    205 + slot as u16,
                    format!("{mechanic:?} {}", data.name),
                    context,
                );
                break;
            }
        }
    }

    fn exile_cast_actions(&mut self) {
        let game = self.game;
        for (idx, card) in game
            .castable_from_exile(self.perspective)
            .into_iter()
            .take(EXILE_SLOTS)
            .enumerate()
        {
            let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                continue;
            };
            if self.affordable(card_id, CastMethod::FromExile) {
                self.mask
                    .allow(A_CAST_FROM_EXILE_BASE + idx as u16, "cast from exile");
            }
        }
    }

    fn split_cast_actions(&mut self, sorcery: bool) {
        let game = self.game;
        let me = self.perspective;

        for (idx, &card) in game.players[me].hand.iter().take(HAND_SLOTS).enumerate() {
            let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                continue;
            };
            let Some(data) = game.registry.get(card_id) else {
                continue;
            };
            if data.split_halves().is_none() || data.layout == CardLayout::Aftermath {
                continue;
            }
            for (action, method) in [
                (445u16, CastMethod::LeftHalf),
                (446, CastMethod::RightHalf),
                (447, CastMethod::Fuse),
            ] {
                if game.is_instant_speed(card_id, method) == sorcery {
                    continue;
                }
                if self.affordable(card_id, method) {
                    self.mask.allow_with(
                        action,
                        "cast split half",
                        ActionContext::Hand { hand_idx: idx },
                    );
                }
            }
        }

        // Aftermath halves cast from the graveyard.
        for (idx, &card) in game.players[me]
            .graveyard
            .iter()
            .take(GRAVEYARD_SLOTS)
            .enumerate()
        {
            let Some(card_id) = game.instance(card).map(|i| i.card_id) else {
                continue;
            };
            let Some(data) = game.registry.get(card_id) else {
                continue;
            };
            if data.layout != CardLayout::Aftermath {
                continue;
            }
            if game.is_instant_speed(card_id, CastMethod::Aftermath) == sorcery {
                continue;
            }
            if self.affordable(card_id, CastMethod::Aftermath) {
                self.mask.allow_with(
                    448,
                    "aftermath cast",
                    ActionContext::Graveyard { graveyard_idx: idx },
                );
            }
        }
    }

    fn activated_abilities(&mut self) {
        let game = self.game;
        let p = &game.players[self.perspective];
        for (bf_idx, &card) in p.battlefield.iter().take(BATTLEFIELD_SLOTS).enumerate() {
            let abilities = self.handler.activated_abilities(game, card);
            for (ability_idx, ability) in abilities.iter().take(ABILITY_SLOTS).enumerate() {
                if ability.is_mana_ability() || ability.is_loyalty() {
                    continue;
                }
                if ability.tap_cost
                    && (p.is_tapped(card)
                        || (game.is_creature(card) && p.is_summoning_sick(card)))
                {
                    continue;
                }
                if ability.sorcery_only && !self.sorcery_ok() {
                    continue;
                }
                if !self
                    .mana
                    .can_pay(game, self.perspective, &ability.cost, 0)
                {
                    continue;
                }
                let index = 100 + (bf_idx * ABILITY_SLOTS + ability_idx) as u16;
                self.mask.allow(index, "activate ability");

                // Non-mana tap abilities of lands also surface in the
                // dedicated land-effect block.
                if ability.tap_cost
                    && bf_idx < 12
                    && game.card_data(card).is_some_and(|d| d.is_land())
                {
                    self.mask.allow(88 + bf_idx as u16, "tap land for effect");
                }
            }
        }
    }

    fn face_up_actions(&mut self) {
        let game = self.game;
        let p = &game.players[self.perspective];
        for &card in p.battlefield.iter().take(BATTLEFIELD_SLOTS) {
            let Some(instance) = game.instance(card) else {
                continue;
            };
            if !instance.face_down {
                continue;
            }
            let Some(data) = game.registry.get(instance.card_id) else {
                continue;
            };
            if instance.morphed {
                if let Some(cost) = data.keyword_cost(Keyword::Morph) {
                    if self.mana.can_pay(game, self.perspective, &cost, 0) {
                        self.mask.allow_with(
                            455,
                            "turn morph face up",
                            ActionContext::Battlefield {
                                battlefield_idx: self.battlefield_index(card),
                            },
                        );
                    }
                }
            }
            if instance.manifested
                && data.is_creature()
                && self
                    .mana
                    .can_pay(game, self.perspective, &data.mana_cost, 0)
            {
                self.mask.allow_with(
                    456,
                    "turn manifest face up",
                    ActionContext::Battlefield {
                        battlefield_idx: self.battlefield_index(card),
                    },
                );
            }
        }
    }

    fn battlefield_special_actions(&mut self) {
        let game = self.game;
        let me = self.perspective;
        let p = &game.players[me];

        for (idx, &card) in p.battlefield.iter().take(BATTLEFIELD_SLOTS).enumerate() {
            let Some(instance) = game.instance(card) else {
                continue;
            };
            let Some(data) = game.registry.get(instance.card_id) else {
                continue;
            };

            if data.layout == CardLayout::Transform && !instance.face_down {
                self.mask.allow(160 + idx as u16, "transform");
            }
            if data.layout == CardLayout::Flip && !instance.transformed {
                self.mask.allow_with(
                    449,
                    "flip",
                    ActionContext::Battlefield {
                        battlefield_idx: idx,
                    },
                );
            }

            // Rooms and Classes.
            if idx < 5 {
                if data.types.has_subtype("Room") && instance.doors_unlocked < 0b11 {
                    let door_cost = data
                        .faces
                        .get(usize::from(instance.doors_unlocked & 1))
                        .map(|f| f.mana_cost);
                    if door_cost
                        .is_some_and(|c| self.mana.can_pay(game, me, &c, 0))
                    {
                        self.mask.allow(248 + idx as u16, "unlock door");
                    }
                }
                if data.types.has_subtype("Class") && instance.level >= 1 {
                    let next = data.level_costs.get(usize::from(instance.level - 1));
                    if next.is_some_and(|c| self.mana.can_pay(game, me, c, 0)) {
                        self.mask.allow(253 + idx as u16, "level up class");
                    }
                }
            }

            // Attachments.
            if data.is_equipment() || data.is_fortification() {
                let is_fortification = data.is_fortification();
                let cost = data.attach_cost;
                let has_target = p.battlefield.iter().any(|&t| {
                    t != card
                        && if is_fortification {
                            game.card_data(t).is_some_and(|d| d.is_land())
                        } else {
                            game.is_creature(t)
                        }
                });
                if has_target && cost.is_some_and(|c| self.mana.can_pay(game, me, &c, 0)) {
                    let action = if is_fortification { 453 } else { 450 };
                    self.mask.allow_with(
                        action,
                        "attach",
                        ActionContext::Attach {
                            source_idx: idx,
                            target_idx: 0,
                        },
                    );
                }
                if data.has_keyword(Keyword::Reconfigure) {
                    if let Some(cost) = data.keyword_cost(Keyword::Reconfigure) {
                        if self.mana.can_pay(game, me, &cost, 0) {
                            self.mask.allow_with(
                                454,
                                "reconfigure",
                                ActionContext::Attach {
                                    source_idx: idx,
                                    target_idx: 0,
                                },
                            );
                        }
                    }
                }
            }

            // Grandeur: a hand copy of this legendary card.
            if data.has_keyword(Keyword::Grandeur) {
                if let Some(hand_idx) = p.hand.iter().position(|&h| {
                    game.instance(h).map(|i| i.card_id) == Some(instance.card_id)
                }) {
                    self.mask.allow_with(
                        460,
                        "grandeur discard",
                        ActionContext::Hand { hand_idx },
                    );
                }
            }
        }

        // Conspire: a spell on the stack and two untapped creatures.
        if !game.stack.is_empty() {
            let untapped: Vec<usize> = p
                .battlefield
                .iter()
                .enumerate()
                .filter(|(_, &c)| game.is_creature(c) && !p.is_tapped(c))
                .map(|(i, _)| i)
                .collect();
            let conspire_spell = game
                .stack
                .items()
                .iter()
                .rev()
                .find(|i| i.controller == me && i.is_spell());
            if untapped.len() >= 2 {
                if let Some(item) = conspire_spell {
                    let has_conspire = match item.kind {
                        crate::stack::StackItemKind::Spell { card_id, .. } => game
                            .registry
                            .get(card_id)
                            .is_some_and(|d| d.has_keyword(Keyword::Conspire)),
                        _ => false,
                    };
                    if has_conspire {
                        self.mask.allow_with(
                            458,
                            "conspire",
                            ActionContext::Conspire {
                                stack_idx: game.stack.len() - 1,
                                creature1_idx: untapped[0],
                                creature2_idx: untapped[1],
                            },
                        );
                    }
                }
            }
        }
    }

    fn loyalty_actions(&mut self) {
        let game = self.game;
        let me = self.perspective;
        for (idx, &card) in game.players[me]
            .battlefield
            .iter()
            .take(BATTLEFIELD_SLOTS)
            .enumerate()
        {
            if !game
                .type_line_of(card)
                .is_some_and(|t| t.is_planeswalker())
            {
                continue;
            }
            if game.players[me].activated_this_turn.contains(&card) {
                continue;
            }
            let loyalty = game.instance(card).map_or(0, |i| i.loyalty());
            for ability in self.handler.activated_abilities(game, card) {
                let Some(delta) = ability.loyalty_delta else {
                    continue;
                };
                if i32::from(delta) < 0 && loyalty + i32::from(delta) < 0 {
                    continue;
                }
                let offset = if ability.is_ultimate {
                    8 // LoyaltyUltimate
                } else if delta > 0 {
                    5 // LoyaltyPlus
                } else if delta == 0 {
                    7 // LoyaltyZero
                } else {
                    6 // LoyaltyMinus
                };
                self.mask.allow_with(
                    A_COMBAT_SUB_BASE + offset,
                    "loyalty ability",
                    ActionContext::Loyalty {
                        battlefield_idx: idx,
                    },
                );
            }
        }
    }

    fn mechanic_actions(&mut self) {
        let game = self.game;
        let me = self.perspective;
        let p = &game.players[me];

        let controls_keyword = |kw: Keyword| {
            p.battlefield
                .iter()
                .any(|&c| game.card_data(c).is_some_and(|d| d.has_keyword(kw)))
        };

        if controls_keyword(Keyword::Investigate) {
            self.mask.allow(A_MECHANIC_BASE, "investigate");
        }
        // Foretell (mechanic slot 1) from hand.
        if let Some(idx) = p.hand.iter().take(HAND_SLOTS).position(|&c| {
            game.card_data(c)
                .is_some_and(|d| d.has_keyword(Keyword::Foretell))
        }) {
            if self.can_pay_plain(2) {
                self.mask.allow_with(
                    A_MECHANIC_BASE + 1,
                    "foretell",
                    ActionContext::Hand { hand_idx: idx },
                );
            }
        }
        if controls_keyword(Keyword::Amass) {
            self.mask.allow(A_MECHANIC_BASE + 2, "amass");
        }
        if controls_keyword(Keyword::Learn) {
            self.mask.allow(A_MECHANIC_BASE + 3, "learn");
        }
        if controls_keyword(Keyword::Venture) {
            self.mask.allow(A_MECHANIC_BASE + 4, "venture");
        }
        if controls_keyword(Keyword::Explore) {
            self.mask.allow(A_MECHANIC_BASE + 6, "explore");
        }
        // Adapt.
        for (idx, &card) in p.battlefield.iter().take(BATTLEFIELD_SLOTS).enumerate() {
            let Some(data) = game.card_data(card) else {
                continue;
            };
            if data.has_keyword(Keyword::Adapt)
                && game
                    .instance(card)
                    .is_some_and(|i| i.counter(CounterKind::PlusOnePlusOne) == 0)
                && data
                    .keyword_cost(Keyword::Adapt)
                    .is_some_and(|c| self.mana.can_pay(game, me, &c, 0))
            {
                self.mask.allow_with(
                    A_MECHANIC_BASE + 7,
                    "adapt",
                    ActionContext::Battlefield {
                        battlefield_idx: idx,
                    },
                );
                break;
            }
        }
        // Mutate.
        if let Some(idx) = p.hand.iter().take(HAND_SLOTS).position(|&c| {
            game.card_data(c)
                .is_some_and(|d| d.has_keyword(Keyword::Mutate))
        }) {
            let host_exists = p.battlefield.iter().any(|&c| game.is_creature(c));
            let card = p.hand[idx];
            let affordable = game
                .card_data(card)
                .and_then(|d| d.keyword_cost(Keyword::Mutate))
                .is_some_and(|c| self.mana.can_pay(game, me, &c, 0));
            if host_exists && affordable {
                self.mask.allow_with(
                    A_MECHANIC_BASE + 8,
                    "mutate",
                    ActionContext::Attach {
                        source_idx: idx,
                        target_idx: 0,
                    },
                );
            }
        }
        // Cycling is instant speed, but surfacing it here keeps all the
        // keyworded actions together; it is also emitted with priority.
        if let Some(idx) = p.hand.iter().take(HAND_SLOTS).position(|&c| {
            let Some(data) = game.card_data(c) else {
                return false;
            };
            data.has_keyword(Keyword::Cycling)
                && data
                    .keyword_cost(Keyword::Cycling)
                    .is_some_and(|cost| self.mana.can_pay(game, me, &cost, 0))
        }) {
            self.mask.allow_with(
                A_MECHANIC_BASE + 9,
                "cycling",
                ActionContext::Hand { hand_idx: idx },
            );
        }
        // Goad.
        if controls_keyword(Keyword::Goad) {
            let target_exists = game.players[me.opponent()]
                .battlefield
                .iter()
                .any(|&c| game.is_creature(c));
            if target_exists {
                self.mask.allow_with(
                    A_MECHANIC_BASE + 10,
                    "goad",
                    ActionContext::Battlefield {
                        battlefield_idx: 0,
                    },
                );
            }
        }
        // Boast.
        for (idx, &card) in p.battlefield.iter().take(BATTLEFIELD_SLOTS).enumerate() {
            let Some(data) = game.card_data(card) else {
                continue;
            };
            if data.has_keyword(Keyword::Boast)
                && p.attacked_this_turn.contains(&card)
                && data
                    .keyword_cost(Keyword::Boast)
                    .is_some_and(|c| self.mana.can_pay(game, me, &c, 0))
            {
                self.mask.allow_with(
                    A_MECHANIC_BASE + 11,
                    "boast",
                    ActionContext::Battlefield {
                        battlefield_idx: idx,
                    },
                );
                break;
            }
        }
    }

    fn combat_actions(&mut self) {
        let game = self.game;
        let me = self.perspective;

        match game.phase {
            Phase::DeclareAttackers if me == game.active => {
                for (idx, &card) in game.players[me]
                    .battlefield
                    .iter()
                    .take(BATTLEFIELD_SLOTS)
                    .enumerate()
                {
                    if !game.combat.attackers.contains(&card)
                        && game.can_attack(self.handler, card)
                    {
                        self.mask.allow(28 + idx as u16, "declare attacker");
                    }
                }
                if !game.combat.attackers.is_empty() {
                    for (i, _) in game.defending_planeswalkers().iter().take(5).enumerate() {
                        self.mask
                            .allow(A_ATTACK_PW_BASE + i as u16, "attack planeswalker");
                    }
                    for (i, _) in game.defending_battles().iter().take(5).enumerate() {
                        self.mask
                            .allow(A_ATTACK_BATTLE_BASE + i as u16, "attack battle");
                    }
                    // Exert the most recent attacker.
                    if let Some(&last) = game.combat.attackers.last() {
                        if self
                            .handler
                            .has_keyword(game, last, Keyword::Exert)
                            || game
                                .card_data(last)
                                .is_some_and(|d| d.has_keyword(Keyword::Exert))
                        {
                            self.mask.allow(A_MECHANIC_BASE + 5, "exert attacker");
                        }
                    }
                }
                self.mask
                    .allow(A_COMBAT_SUB_BASE + 3, "declare attackers done");
            }
            Phase::DeclareBlockers if me == game.defending_player() => {
                for (idx, &card) in game.players[me]
                    .battlefield
                    .iter()
                    .take(BATTLEFIELD_SLOTS)
                    .enumerate()
                {
                    let already_blocking = game
                        .combat
                        .blocks
                        .values()
                        .any(|blockers| blockers.contains(&card));
                    if already_blocking {
                        continue;
                    }
                    let can_block_any = game
                        .combat
                        .attackers
                        .iter()
                        .any(|&a| game.can_block(self.handler, card, a));
                    if can_block_any {
                        self.mask.allow_with(
                            48 + idx as u16,
                            "declare blocker",
                            ActionContext::Block { attacker_idx: 0 },
                        );
                    }
                }
                for (i, _) in game.combat.attackers.iter().take(10).enumerate() {
                    self.mask
                        .allow(A_MULTI_BLOCK_BASE + i as u16, "gang block attacker");
                }
                if game
                    .combat
                    .targets
                    .values()
                    .any(|t| matches!(t, crate::combat::AttackTarget::Battle(_)))
                {
                    self.mask.allow_with(
                        204,
                        "defend battle",
                        ActionContext::DefendBattle {
                            battle_idx: 0,
                            defender_idx: 0,
                        },
                    );
                }
                self.ninjutsu_offer();
                self.mask
                    .allow(A_COMBAT_SUB_BASE + 4, "declare blockers done");
            }
            Phase::FirstStrikeDamage | Phase::CombatDamage if me == game.active => {
                // The attacker's first priority window after blocks are
                // committed: ninjutsu swaps happen here.
                self.ninjutsu_offer();
                let multi_blocked = game.combat.blocks.values().any(|b| b.len() > 1);
                if multi_blocked {
                    self.mask.allow_with(
                        A_COMBAT_SUB_BASE,
                        "set damage order",
                        ActionContext::DamageOrder {
                            attacker_idx: 0,
                            order: Vec::new(),
                        },
                    );
                }
                self.mask
                    .allow(A_COMBAT_SUB_BASE + 1, "assign combat damage");
            }
            _ => {}
        }

        // The defender may shield an attacked planeswalker while they
        // hold priority in the blocker or damage steps.
        if me == game.defending_player()
            && matches!(
                game.phase,
                Phase::DeclareBlockers | Phase::FirstStrikeDamage | Phase::CombatDamage
            )
        {
            let walker_attacked = game
                .combat
                .targets
                .values()
                .any(|t| matches!(t, crate::combat::AttackTarget::Planeswalker(_)));
            let has_soaker = game.players[me]
                .battlefield
                .iter()
                .any(|&c| game.is_creature(c));
            if walker_attacked && has_soaker {
                self.mask.allow_with(
                    A_COMBAT_SUB_BASE + 9,
                    "protect planeswalker",
                    ActionContext::Protect {
                        planeswalker_idx: 0,
                        defender_idx: 0,
                    },
                );
            }
        }
    }

    fn ninjutsu_offer(&mut self) {
        let game = self.game;
        // Ninjutsu belongs to the attacking player. The defender holds
        // priority through most of the blocker step, so surface it for
        // the active player whenever they hold priority here instead.
        let attacker_player = game.active;
        if self.perspective != attacker_player {
            return;
        }
        let unblocked_exists = game
            .combat
            .attackers
            .iter()
            .any(|&a| !game.combat.is_blocked(a));
        if !unblocked_exists {
            return;
        }
        for (idx, &card) in game.players[attacker_player]
            .hand
            .iter()
            .take(HAND_SLOTS)
            .enumerate()
        {
            let ninjutsu_cost = game
                .card_data(card)
                .and_then(|d| d.keyword_cost(Keyword::Ninjutsu));
            if ninjutsu_cost.is_some_and(|c| self.mana.can_pay(game, attacker_player, &c, 0)) {
                self.mask.allow_with(
                    A_COMBAT_SUB_BASE + 2,
                    "ninjutsu",
                    ActionContext::Ninjutsu {
                        hand_idx: idx,
                        attacker_idx: 0,
                    },
                );
                break;
            }
        }
    }

    fn phase_controls(&mut self) {
        let game = self.game;
        if self.perspective != game.active || !game.stack.is_empty() {
            return;
        }
        match game.phase {
            Phase::Upkeep => self.mask.allow(7, "end upkeep"),
            Phase::Draw => self.mask.allow(2, "to main phase"),
            Phase::MainPre | Phase::MainPost => {
                self.mask.allow(3, "end main phase");
                self.mask.allow(A_END_TURN, "pass the turn");
            }
            Phase::BeginCombat => self.mask.allow(8, "to declare attackers"),
            Phase::EndOfCombat => self.mask.allow(9, "end combat"),
            Phase::EndStep => self.mask.allow(10, "to cleanup"),
            _ => {}
        }
    }

    // === Small helpers ===

    fn sorcery_ok(&self) -> bool {
        let game = self.game;
        game.active == self.perspective
            && game.phase.is_main()
            && game.stack.is_empty()
            && game.priority == Some(self.perspective)
    }

    fn affordable(&self, card_id: crate::cards::CardId, method: CastMethod) -> bool {
        let extras = CastExtras::default();
        match self.game.cast_cost(card_id, method, &extras) {
            Some(cost) => self.mana.can_pay(self.game, self.perspective, &cost, 0),
            None => false,
        }
    }

    fn can_pay_plain(&self, generic: u8) -> bool {
        self.mana.can_pay(
            self.game,
            self.perspective,
            &crate::core::ManaCost::generic(generic),
            0,
        )
    }

    fn battlefield_index(&self, card: CardHandle) -> usize {
        self.game.players[self.perspective]
            .battlefield
            .iter()
            .position(|&c| c == card)
            .unwrap_or(0)
    }

    /// Both battlefields, own first, as the shared counter-target list.
    fn counter_targets(&self) -> Vec<CardHandle> {
        let game = self.game;
        game.players[self.perspective]
            .battlefield
            .iter()
            .chain(game.players[self.perspective.opponent()].battlefield.iter())
            .copied()
            .take(10)
            .collect()
    }

    fn zone_indexed(&mut self, base: u16, cap: usize, reason: &str, zone: Zone) {
        let len = self.game.players[self.perspective].zone(zone).len();
        for i in 0..len.min(cap) {
            self.mask.allow(base + i as u16, reason.to_string());
        }
        if len == 0 {
            self.mask.allow(A_NO_OP, "zone empty");
        }
    }
}

enum ZoneKind {
    Hand,
    Graveyard,
}

fn zone_kind(mechanic: &AltMechanic) -> ZoneKind {
    match mechanic {
        AltMechanic::Disturb
        | AltMechanic::Eternalize
        | AltMechanic::Embalm
        | AltMechanic::Unearth
        | AltMechanic::Encore => ZoneKind::Graveyard,
        _ => ZoneKind::Hand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{AbilityData, CardData, CardId, CardRegistry, CardType, ManaProduce, TypeLine};
    use crate::core::{Color, ManaCost, PlayerPair};
    use crate::game::{GameConfig, ZonePlacement};
    use crate::rules::{BasicAbilityHandler, PoolManaSystem};

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(
            CardData::new(
                CardId::new(1),
                "Forest",
                TypeLine::of(CardType::Land).with_subtype("Forest"),
            )
            .with_ability(AbilityData::mana(ManaProduce::Color(Color::Green))),
        );
        r.register(
            CardData::new(CardId::new(2), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::generic(1).with_pips(Color::Green, 1))
                .with_stats(2, 2),
        );
        r.register(
            CardData::new(CardId::new(3), "Shock", TypeLine::of(CardType::Instant))
                .with_cost(ManaCost::free().with_pips(Color::Red, 1)),
        );
        r
    }

    fn ready_game() -> (Game, BasicAbilityHandler, PoolManaSystem) {
        let deck: Vec<CardId> = (0..30).map(|i| CardId::new(i % 3 + 1)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            31,
        );
        let handler = BasicAbilityHandler::new();
        game.keep_hand(PlayerId::P1);
        game.keep_hand(PlayerId::P2);
        game.begin_first_turn(&handler);
        (game, handler, PoolManaSystem::new())
    }

    fn mask_for(game: &Game, handler: &BasicAbilityHandler, mana: &PoolManaSystem, p: PlayerId) -> ActionMask {
        ActionMaskGenerator::generate(game, handler, mana, p)
    }

    #[test]
    fn test_mask_never_empty() {
        let (game, handler, mana) = ready_game();
        for p in PlayerId::both() {
            assert!(mask_for(&game, &handler, &mana, p).count() > 0);
        }
    }

    #[test]
    fn test_mulligan_mask() {
        let deck: Vec<CardId> = (0..30).map(|_| CardId::new(2)).collect();
        let game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            37,
        );
        let handler = BasicAbilityHandler::new();
        let mana = PoolManaSystem::new();

        let mask = mask_for(&game, &handler, &mana, PlayerId::P1);
        assert!(mask.allowed(A_KEEP_HAND));
        assert!(mask.allowed(A_MULLIGAN));
        assert!(!mask.allowed(A_PASS_PRIORITY));
    }

    #[test]
    fn test_bottoming_mask_covers_first_four() {
        let deck: Vec<CardId> = (0..30).map(|_| CardId::new(2)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            41,
        );
        let handler = BasicAbilityHandler::new();
        let mana = PoolManaSystem::new();
        game.take_mulligan(PlayerId::P1);
        game.keep_hand(PlayerId::P1);

        let mask = mask_for(&game, &handler, &mana, PlayerId::P1);
        for i in 0..4u16 {
            assert!(mask.allowed(A_BOTTOM_BASE + i), "bottom idx {i}");
        }
        assert!(!mask.allowed(A_KEEP_HAND));
    }

    #[test]
    fn test_non_priority_player_gets_noop() {
        let (game, handler, mana) = ready_game();
        // P1 holds priority in their upkeep; P2 waits.
        let mask = mask_for(&game, &handler, &mana, PlayerId::P2);
        assert!(mask.allowed(A_NO_OP));
        assert!(!mask.allowed(A_PASS_PRIORITY));
    }

    #[test]
    fn test_sorcery_gating_in_main() {
        let (mut game, handler, mana) = ready_game();
        // Walk to main phase.
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);
        assert_eq!(game.phase, Phase::MainPre);

        // Pin a land into the hand so the land-drop action is present.
        let first = game.players[PlayerId::P1].hand[0];
        game.store.get_mut(first).unwrap().card_id = CardId::new(1);

        let mask = mask_for(&game, &handler, &mana, PlayerId::P1);
        // Land drop is offered for each land in hand.
        let has_land_action = (13..20).any(|i| mask.allowed(i));
        assert!(has_land_action);
        assert!(mask.allowed(A_PASS_PRIORITY));
        assert!(mask.allowed(3), "main phase end");
    }

    #[test]
    fn test_land_play_removes_land_actions() {
        let (mut game, handler, mana) = ready_game();
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);

        let land = game.players[PlayerId::P1].hand[0];
        game.store.get_mut(land).unwrap().card_id = CardId::new(1);
        assert!(game.play_land(&handler, PlayerId::P1, land, false));

        let mask = mask_for(&game, &handler, &mana, PlayerId::P1);
        for i in 13..20 {
            assert!(!mask.allowed(i), "no second land drop");
        }
    }

    #[test]
    fn test_split_second_locks_to_mana_abilities() {
        let (mut game, handler, mana) = ready_game();
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);

        // Force a split-second item onto the stack.
        let card = game.players[PlayerId::P1].hand[0];
        let card = game
            .move_card(&handler, card, crate::core::Zone::Stack, ZonePlacement::Top, None)
            .unwrap();
        let mut context = crate::stack::SpellContext::default();
        context.split_second = true;
        game.stack.push(
            crate::stack::StackItemKind::Spell {
                card,
                card_id: CardId::new(3),
            },
            PlayerId::P1,
            context,
        );
        game.assign_priority(PlayerId::P2);

        let mask = mask_for(&game, &handler, &mana, PlayerId::P2);
        assert!(mask.allowed(A_PASS_PRIORITY));
        for idx in mask.set_indices() {
            assert!(
                idx == A_PASS_PRIORITY || (68..88).contains(&idx),
                "only pass/mana under split second, got {idx}"
            );
        }
    }

    #[test]
    fn test_game_over_mask_is_noop() {
        let (mut game, handler, mana) = ready_game();
        game.flag_loss(PlayerId::P2);

        let mask = mask_for(&game, &handler, &mana, PlayerId::P1);
        assert_eq!(mask.count(), 1);
        assert!(mask.allowed(A_NO_OP));
    }
}
