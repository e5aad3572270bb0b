//! Choice sub-protocols: targeting, sacrifice, modes, X, colour, and
//! scry/surveil.
//!
//! At most one context is active at a time, and the game's phase
//! mirrors it (`Targeting`, `Sacrifice`, `Choose`). Each protocol
//! advances one action per `apply` call, driven entirely by the mask;
//! finalisation writes the choices into the originating stack item or
//! pending spell and restores the parked phase.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::cards::SacrificeFilter;
use crate::core::{CardHandle, Color, Phase, PlayerId, Zone};
use crate::game::{Game, GameEvent, ZonePlacement};
use crate::rules::{AbilityHandler, ManaSystem, TargetRequirement};
use crate::stack::TargetRef;

/// Most target lists expose at most this many candidates.
pub const MAX_TARGET_CANDIDATES: usize = 10;

/// Choosing targets for a stack item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetingContext {
    /// The stack item the targets are written into.
    pub item: u32,
    pub controller: PlayerId,
    pub requirement: TargetRequirement,
    pub selected: SmallVec<[TargetRef; 4]>,
}

/// Choosing permanents to sacrifice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SacrificeContext {
    /// Stack item the sacrifice is recorded on, if cost-driven.
    pub item: Option<u32>,
    pub controller: PlayerId,
    pub filter: SacrificeFilter,
    pub count: u8,
    pub selected: SmallVec<[CardHandle; 2]>,
}

/// The modal/X/colour/scry/surveil protocols.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChoiceKind {
    Mode {
        available: u8,
        min: u8,
        max: u8,
        selected: SmallVec<[u8; 4]>,
    },
    XValue,
    Color,
    Scry {
        remaining: Vec<CardHandle>,
        to_top: Vec<CardHandle>,
        to_bottom: Vec<CardHandle>,
    },
    Surveil {
        remaining: Vec<CardHandle>,
        to_top: Vec<CardHandle>,
        to_graveyard: Vec<CardHandle>,
    },
}

/// One active choice protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceContext {
    pub controller: PlayerId,
    /// Stack item the choice is written into, when stack-driven.
    pub item: Option<u32>,
    pub kind: ChoiceKind,
}

impl Game {
    /// Whether any choice sub-protocol is active.
    #[must_use]
    pub fn in_choice_flow(&self) -> bool {
        self.targeting.is_some() || self.sacrifice.is_some() || self.choice.is_some()
    }

    /// The player who must act in the current sub-protocol.
    #[must_use]
    pub fn choice_controller(&self) -> Option<PlayerId> {
        if let Some(t) = &self.targeting {
            return Some(t.controller);
        }
        if let Some(s) = &self.sacrifice {
            return Some(s.controller);
        }
        self.choice.as_ref().map(|c| c.controller)
    }

    // === Targeting ===

    /// Open a targeting context for a stack item.
    pub fn begin_targeting(&mut self, item: u32, controller: PlayerId, req: TargetRequirement) {
        debug!(item, "targeting begins");
        self.targeting = Some(TargetingContext {
            item,
            controller,
            requirement: req,
            selected: SmallVec::new(),
        });
        self.enter_subphase(Phase::Targeting);
        self.assign_priority(controller);
    }

    /// Valid targets not yet selected, capped for the action mapping.
    #[must_use]
    pub fn current_target_candidates(&self, handler: &dyn AbilityHandler) -> Vec<TargetRef> {
        let Some(ctx) = &self.targeting else {
            return Vec::new();
        };
        handler
            .valid_targets(self, ctx.controller, &ctx.requirement)
            .into_iter()
            .filter(|t| !ctx.selected.contains(t))
            .take(MAX_TARGET_CANDIDATES)
            .collect()
    }

    /// Select the i-th current candidate. Auto-finalises at max arity.
    pub fn select_target(&mut self, handler: &dyn AbilityHandler, idx: usize) -> bool {
        let candidates = self.current_target_candidates(handler);
        let Some(&target) = candidates.get(idx) else {
            return false;
        };
        let Some(ctx) = &mut self.targeting else {
            return false;
        };
        ctx.selected.push(target);
        if ctx.selected.len() >= ctx.requirement.max as usize {
            self.finalize_targeting();
        }
        true
    }

    /// Finalise if the arity bounds allow; called on pass as well.
    pub fn finalize_targeting(&mut self) -> bool {
        let Some(ctx) = self.targeting.take() else {
            return false;
        };
        if (ctx.selected.len() as u8) < ctx.requirement.min {
            self.targeting = Some(ctx);
            return false;
        }
        if let Some(item) = self.stack.get_mut(ctx.item) {
            item.context.targets = ctx.selected;
            item.context.needs_new_targets = false;
            item.context.targets_chosen = true;
        }
        debug!(item = ctx.item, "targeting finalised");
        self.resume_after_choice(ctx.controller);
        true
    }

    // === Sacrifice ===

    /// Open a sacrifice context.
    pub fn begin_sacrifice(
        &mut self,
        item: Option<u32>,
        controller: PlayerId,
        filter: SacrificeFilter,
        count: u8,
    ) {
        self.sacrifice = Some(SacrificeContext {
            item,
            controller,
            filter,
            count,
            selected: SmallVec::new(),
        });
        self.enter_subphase(Phase::Sacrifice);
        self.assign_priority(controller);
    }

    /// Permanents currently legal to sacrifice, capped at 10.
    #[must_use]
    pub fn current_sacrifice_candidates(&self) -> Vec<CardHandle> {
        let Some(ctx) = &self.sacrifice else {
            return Vec::new();
        };
        self.players[ctx.controller]
            .battlefield
            .iter()
            .copied()
            .filter(|&c| !ctx.selected.contains(&c) && self.matches_sacrifice_filter(c, ctx.filter))
            .take(MAX_TARGET_CANDIDATES)
            .collect()
    }

    fn matches_sacrifice_filter(&self, card: CardHandle, filter: SacrificeFilter) -> bool {
        let Some(line) = self.type_line_of(card) else {
            return false;
        };
        match filter {
            SacrificeFilter::Permanent => true,
            SacrificeFilter::Creature => self.is_creature(card),
            SacrificeFilter::Artifact => line.has_type(crate::cards::CardType::Artifact),
            SacrificeFilter::Enchantment => line.has_type(crate::cards::CardType::Enchantment),
            SacrificeFilter::Land => line.is_land(),
        }
    }

    /// Select the i-th sacrificable permanent. Auto-finalises when the
    /// required count is reached.
    pub fn select_sacrifice(&mut self, handler: &dyn AbilityHandler, idx: usize) -> bool {
        let candidates = self.current_sacrifice_candidates();
        let Some(&card) = candidates.get(idx) else {
            return false;
        };
        let Some(ctx) = &mut self.sacrifice else {
            return false;
        };
        ctx.selected.push(card);
        if ctx.selected.len() >= ctx.count as usize {
            return self.finalize_sacrifice(handler);
        }
        true
    }

    /// Perform the selected sacrifices and record them on the item.
    pub fn finalize_sacrifice(&mut self, handler: &dyn AbilityHandler) -> bool {
        let Some(ctx) = self.sacrifice.take() else {
            return false;
        };
        if (ctx.selected.len() as u8) < ctx.count {
            self.sacrifice = Some(ctx);
            return false;
        }

        let mut moved: SmallVec<[CardHandle; 2]> = SmallVec::new();
        for card in ctx.selected {
            let card_id = match self.instance(card) {
                Some(i) => i.card_id,
                None => continue,
            };
            if let Ok(new_handle) =
                self.move_card(handler, card, Zone::Graveyard, ZonePlacement::Top, None)
            {
                moved.push(new_handle);
                self.fire_event(
                    handler,
                    GameEvent::Sacrificed {
                        card_id,
                        controller: ctx.controller,
                    },
                );
            }
        }
        if let Some(item_id) = ctx.item {
            if let Some(item) = self.stack.get_mut(item_id) {
                item.context.sacrificed = moved;
            }
        } else if let Some(pending) = &mut self.pending_spell {
            pending.context.sacrificed = moved;
            pending.additional_paid = true;
        }
        self.resume_after_choice(ctx.controller);
        true
    }

    // === Mode / X / colour ===

    /// Open a mode-selection context for the pending spell.
    pub fn begin_mode_choice(&mut self, controller: PlayerId, available: u8, min: u8, max: u8) {
        self.choice = Some(ChoiceContext {
            controller,
            item: None,
            kind: ChoiceKind::Mode {
                available,
                min,
                max,
                selected: SmallVec::new(),
            },
        });
        self.enter_subphase(Phase::Choose);
        self.assign_priority(controller);
    }

    /// Cumulatively select a mode. Auto-finalises at max.
    pub fn choose_mode(&mut self, mode_idx: u8) -> bool {
        let Some(ctx) = &mut self.choice else {
            return false;
        };
        let ChoiceKind::Mode {
            available,
            max,
            selected,
            ..
        } = &mut ctx.kind
        else {
            return false;
        };
        if mode_idx >= *available || selected.contains(&mode_idx) {
            return false;
        }
        selected.push(mode_idx);
        if selected.len() >= *max as usize {
            return self.finalize_modes();
        }
        true
    }

    /// Write the chosen modes into the pending spell.
    pub fn finalize_modes(&mut self) -> bool {
        let Some(ctx) = self.choice.take() else {
            return false;
        };
        let ChoiceKind::Mode {
            min, ref selected, ..
        } = ctx.kind
        else {
            self.choice = Some(ctx);
            return false;
        };
        if (selected.len() as u8) < min {
            self.choice = Some(ctx);
            return false;
        }
        if let Some(pending) = &mut self.pending_spell {
            pending.context.modes = selected.clone();
            pending.modes_chosen = true;
        }
        self.leave_subphase();
        self.assign_priority(ctx.controller);
        true
    }

    /// Open an X-value choice for a committed stack item.
    pub fn begin_x_choice(&mut self, item: u32, controller: PlayerId) {
        self.choice = Some(ChoiceContext {
            controller,
            item: Some(item),
            kind: ChoiceKind::XValue,
        });
        self.enter_subphase(Phase::Choose);
        self.assign_priority(controller);
    }

    /// Choose X. Affordability is checked and the X mana paid here,
    /// not earlier.
    pub fn choose_x(&mut self, mana: &dyn ManaSystem, x: u32) -> bool {
        let Some(ctx) = &self.choice else {
            return false;
        };
        if !matches!(ctx.kind, ChoiceKind::XValue) {
            return false;
        }
        let controller = ctx.controller;
        let Some(item_id) = ctx.item else {
            return false;
        };

        if mana
            .pay(self, controller, &crate::core::ManaCost::free(), x)
            .is_err()
        {
            return false;
        }
        if let Some(item) = self.stack.get_mut(item_id) {
            item.context.x = Some(x);
        }
        self.choice = None;
        self.resume_after_choice(controller);
        true
    }

    /// Open a colour choice for a stack item.
    pub fn begin_color_choice(&mut self, item: u32, controller: PlayerId) {
        self.choice = Some(ChoiceContext {
            controller,
            item: Some(item),
            kind: ChoiceKind::Color,
        });
        self.enter_subphase(Phase::Choose);
        self.assign_priority(controller);
    }

    /// Choose a colour by WUBRG index.
    pub fn choose_color(&mut self, color_idx: usize) -> bool {
        let Some(color) = Color::from_wubrg_index(color_idx) else {
            return false;
        };
        let Some(ctx) = &self.choice else {
            return false;
        };
        if !matches!(ctx.kind, ChoiceKind::Color) {
            return false;
        }
        let controller = ctx.controller;
        if let Some(item_id) = ctx.item {
            if let Some(item) = self.stack.get_mut(item_id) {
                item.context.chosen_color = Some(color);
            }
        }
        self.choice = None;
        self.resume_after_choice(controller);
        true
    }

    // === Scry / surveil ===

    /// Reveal the top `count` cards for scry.
    pub fn begin_scry(&mut self, controller: PlayerId, count: u8) {
        let remaining = self.lift_top_cards(controller, count);
        if remaining.is_empty() {
            return;
        }
        self.choice = Some(ChoiceContext {
            controller,
            item: None,
            kind: ChoiceKind::Scry {
                remaining,
                to_top: Vec::new(),
                to_bottom: Vec::new(),
            },
        });
        self.enter_subphase(Phase::Choose);
        self.assign_priority(controller);
    }

    /// Reveal the top `count` cards for surveil.
    pub fn begin_surveil(&mut self, controller: PlayerId, count: u8) {
        let remaining = self.lift_top_cards(controller, count);
        if remaining.is_empty() {
            return;
        }
        self.choice = Some(ChoiceContext {
            controller,
            item: None,
            kind: ChoiceKind::Surveil {
                remaining,
                to_top: Vec::new(),
                to_graveyard: Vec::new(),
            },
        });
        self.enter_subphase(Phase::Choose);
        self.assign_priority(controller);
    }

    fn lift_top_cards(&mut self, player: PlayerId, count: u8) -> Vec<CardHandle> {
        let take = (count as usize).min(self.players[player].library.len());
        self.players[player].library.drain(0..take).collect()
    }

    /// The card currently being decided in a scry/surveil flow.
    #[must_use]
    pub fn scry_current_card(&self) -> Option<CardHandle> {
        match &self.choice {
            Some(ChoiceContext {
                kind: ChoiceKind::Scry { remaining, .. },
                ..
            })
            | Some(ChoiceContext {
                kind: ChoiceKind::Surveil { remaining, .. },
                ..
            }) => remaining.first().copied(),
            _ => None,
        }
    }

    /// Keep the current card on top (scry and surveil).
    pub fn scry_put_on_top(&mut self, handler: &dyn AbilityHandler) -> bool {
        self.scry_route(handler, ScryRoute::Top)
    }

    /// Put the current card on the bottom (scry only).
    pub fn scry_put_on_bottom(&mut self, handler: &dyn AbilityHandler) -> bool {
        self.scry_route(handler, ScryRoute::Bottom)
    }

    /// Put the current card into the graveyard (surveil only).
    pub fn surveil_put_in_graveyard(&mut self, handler: &dyn AbilityHandler) -> bool {
        self.scry_route(handler, ScryRoute::Graveyard)
    }

    fn scry_route(&mut self, handler: &dyn AbilityHandler, route: ScryRoute) -> bool {
        let Some(ctx) = &mut self.choice else {
            return false;
        };
        let controller = ctx.controller;
        let done = match (&mut ctx.kind, route) {
            (ChoiceKind::Scry { remaining, to_top, .. }, ScryRoute::Top)
            | (ChoiceKind::Surveil { remaining, to_top, .. }, ScryRoute::Top) => {
                if remaining.is_empty() {
                    return false;
                }
                let card = remaining.remove(0);
                to_top.push(card);
                remaining.is_empty()
            }
            (ChoiceKind::Scry { remaining, to_bottom, .. }, ScryRoute::Bottom) => {
                if remaining.is_empty() {
                    return false;
                }
                let card = remaining.remove(0);
                to_bottom.push(card);
                remaining.is_empty()
            }
            (
                ChoiceKind::Surveil {
                    remaining,
                    to_graveyard,
                    ..
                },
                ScryRoute::Graveyard,
            ) => {
                if remaining.is_empty() {
                    return false;
                }
                let card = remaining.remove(0);
                to_graveyard.push(card);
                remaining.is_empty()
            }
            _ => return false,
        };

        if done {
            self.finish_scry(handler, controller);
        }
        true
    }

    fn finish_scry(&mut self, handler: &dyn AbilityHandler, controller: PlayerId) {
        let Some(ctx) = self.choice.take() else {
            return;
        };
        match ctx.kind {
            ChoiceKind::Scry {
                to_top, to_bottom, ..
            } => {
                // First chosen ends up on top; bottoms append in
                // selection order.
                for card in to_top.into_iter().rev() {
                    self.players[controller].library.insert(0, card);
                }
                for card in to_bottom {
                    self.players[controller].library.push(card);
                }
            }
            ChoiceKind::Surveil {
                to_top,
                to_graveyard,
                ..
            } => {
                for card in to_top.into_iter().rev() {
                    self.players[controller].library.insert(0, card);
                }
                for card in to_graveyard {
                    // Cards were lifted out of the library vec but are
                    // still library-zoned; route them properly now.
                    let _ = self.move_card(handler, card, Zone::Graveyard, ZonePlacement::Top, None);
                }
            }
            _ => {
                self.choice = Some(ctx);
                return;
            }
        }
        debug!("scry/surveil complete");
        self.resume_after_choice(controller);
    }

    /// Abort any active choice context, restoring lifted cards to the
    /// library. Used by stuck-state recovery.
    pub fn abort_choice_contexts(&mut self) {
        self.targeting = None;
        self.sacrifice = None;
        if let Some(ctx) = self.choice.take() {
            match ctx.kind {
                ChoiceKind::Scry {
                    remaining,
                    to_top,
                    to_bottom,
                }
                | ChoiceKind::Surveil {
                    remaining,
                    to_top,
                    to_graveyard: to_bottom,
                } => {
                    let controller = ctx.controller;
                    for card in to_top.into_iter().chain(remaining).rev() {
                        self.players[controller].library.insert(0, card);
                    }
                    for card in to_bottom {
                        self.players[controller].library.push(card);
                    }
                }
                _ => {}
            }
        }
    }

    /// Common exit: back to priority on a live stack, otherwise the
    /// parked turn phase.
    fn resume_after_choice(&mut self, controller: PlayerId) {
        if !self.stack.is_empty() {
            if self.phase.is_choice() {
                self.phase = Phase::Priority;
            }
        } else {
            self.leave_subphase();
        }
        self.assign_priority(controller);
    }
}

#[derive(Clone, Copy)]
enum ScryRoute {
    Top,
    Bottom,
    Graveyard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardData, CardId, CardRegistry, CardType, TypeLine};
    use crate::core::{ManaCost, PlayerPair};
    use crate::game::GameConfig;
    use crate::rules::{BasicAbilityHandler, PoolManaSystem, TargetKind};
    use crate::stack::{SpellContext, StackItemKind};

    fn game() -> Game {
        let mut registry = CardRegistry::new();
        registry.register(
            CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::generic(2))
                .with_stats(2, 2),
        );
        let deck: Vec<CardId> = (0..20).map(|_| CardId::new(1)).collect();
        let mut game = Game::new(
            registry,
            GameConfig::default(),
            PlayerPair::with_value(deck),
            21,
        );
        game.phase = Phase::MainPre;
        game
    }

    fn stack_item(game: &mut Game) -> u32 {
        let handler = BasicAbilityHandler::new();
        let card = game.players[PlayerId::P1].hand[0];
        let card = game
            .move_card(&handler, card, Zone::Stack, ZonePlacement::Top, None)
            .unwrap();
        game.stack.push(
            StackItemKind::Spell {
                card,
                card_id: CardId::new(1),
            },
            PlayerId::P1,
            SpellContext::default(),
        )
    }

    #[test]
    fn test_targeting_flow() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        // A creature for each player to target.
        for player in PlayerId::both() {
            let card = game.players[player].hand[0];
            game.move_card(&handler, card, Zone::Battlefield, ZonePlacement::Top, None)
                .unwrap();
        }
        let item = stack_item(&mut game);

        game.begin_targeting(
            item,
            PlayerId::P1,
            TargetRequirement::exactly(TargetKind::Creature, 1),
        );
        assert_eq!(game.phase, Phase::Targeting);

        let candidates = game.current_target_candidates(&handler);
        assert_eq!(candidates.len(), 2);

        assert!(game.select_target(&handler, 0));
        // Auto-finalised at max arity.
        assert!(game.targeting.is_none());
        assert_eq!(game.stack.get(item).unwrap().context.targets.len(), 1);
        assert_eq!(game.phase, Phase::Priority);
    }

    #[test]
    fn test_sacrifice_flow() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        let card = game.players[PlayerId::P1].hand[0];
        game.move_card(&handler, card, Zone::Battlefield, ZonePlacement::Top, None)
            .unwrap();
        let item = stack_item(&mut game);

        game.begin_sacrifice(Some(item), PlayerId::P1, SacrificeFilter::Creature, 1);
        assert_eq!(game.phase, Phase::Sacrifice);
        assert_eq!(game.current_sacrifice_candidates().len(), 1);

        assert!(game.select_sacrifice(&handler, 0));

        assert!(game.sacrifice.is_none());
        assert_eq!(game.players[PlayerId::P1].graveyard.len(), 1);
        assert_eq!(game.stack.get(item).unwrap().context.sacrificed.len(), 1);
    }

    #[test]
    fn test_scry_two_orders_library() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        let top_two: Vec<_> = game.players[PlayerId::P1].library[0..2].to_vec();

        game.begin_scry(PlayerId::P1, 2);
        assert_eq!(game.phase, Phase::Choose);
        assert_eq!(game.scry_current_card(), Some(top_two[0]));

        // First to top, second to bottom.
        assert!(game.scry_put_on_top(&handler));
        assert!(game.scry_put_on_bottom(&handler));

        assert!(game.choice.is_none());
        assert_eq!(game.players[PlayerId::P1].library[0], top_two[0]);
        assert_eq!(*game.players[PlayerId::P1].library.last().unwrap(), top_two[1]);
        assert_eq!(game.phase, Phase::MainPre);
    }

    #[test]
    fn test_surveil_to_graveyard() {
        let mut game = game();
        let handler = BasicAbilityHandler::new();
        let top = game.players[PlayerId::P1].library[0];

        game.begin_surveil(PlayerId::P1, 1);
        assert!(game.surveil_put_in_graveyard(&handler));

        assert_eq!(game.players[PlayerId::P1].graveyard.len(), 1);
        // The handle was reissued on the zone change.
        assert!(game.instance(top).is_none());
    }

    #[test]
    fn test_choose_x_pays_mana() {
        let mut game = game();
        let mana = PoolManaSystem::new();
        let item = stack_item(&mut game);
        game.players[PlayerId::P1].pool.add(Color::Red);
        game.players[PlayerId::P1].pool.add(Color::Red);

        game.begin_x_choice(item, PlayerId::P1);
        assert!(!game.choose_x(&mana, 3), "cannot afford X=3");
        assert!(game.choose_x(&mana, 2));

        assert_eq!(game.stack.get(item).unwrap().context.x, Some(2));
        assert!(game.players[PlayerId::P1].pool.is_empty());
    }

    #[test]
    fn test_mode_choice_writes_pending() {
        let mut game = game();
        game.pending_spell = Some(crate::casting::PendingSpell::stub_for_tests(PlayerId::P1));

        game.begin_mode_choice(PlayerId::P1, 3, 1, 2);
        assert!(game.choose_mode(1));
        assert!(game.choose_mode(2));

        let pending = game.pending_spell.as_ref().unwrap();
        assert!(pending.modes_chosen);
        assert_eq!(pending.context.modes.as_slice(), &[1, 2]);
    }
}
