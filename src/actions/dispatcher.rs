//! The action dispatcher.
//!
//! `apply` validates a chosen index against the freshly generated mask,
//! routes it through an exhaustive match over the decoded action, then
//! drives the post-action loop (SBAs → triggers → stack resolution)
//! until the state is quiescent. Handler panics are caught at this
//! boundary and rolled back to a pre-action snapshot. Nothing errors
//! across the environment API: failures surface as penalties and an
//! `error_message` in the step info.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cards::{CardLayout, CardType, CounterKind, Keyword, ManaProduce};
use crate::casting::CastExtras;
use crate::core::{CardHandle, ManaCost, Phase, PlayerId, Zone};
use crate::game::{
    EffectGrant, Game, GameOutcome, RewardWeights, StateSnapshot, TokenKind, ZonePlacement,
};
use crate::rules::{AbilityHandler, CardEvaluator, ManaSystem, ResponseRole};
use crate::stack::{CastMethod, ResponseKind, SpellContext, StackItemKind};

use super::context::ActionContext;
use super::error::ActionError;
use super::legality::ActionMaskGenerator;
use super::mask::ActionMask;
use super::vocab::*;

/// Safety bound on the post-action reaction loop.
const POST_ACTION_ITERATIONS: usize = 20;

/// Step payload returned to the agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepInfo {
    /// Mask for the next decision point.
    pub action_mask: ActionMask,
    /// Who that mask is for.
    pub decision_player: PlayerId,
    pub game_result: Option<GameOutcome>,
    pub error_message: Option<String>,
    pub turn: u32,
    pub phase: Phase,
}

/// `(reward, done, truncated, info)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub reward: f32,
    pub done: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// The player the next mask belongs to: whoever the decision hierarchy
/// says must act.
#[must_use]
pub fn decision_player(game: &Game) -> PlayerId {
    if !game.mulligans_complete() {
        for player in PlayerId::both() {
            if game.mulligan[player] != crate::mulligan::MulliganState::Done {
                return player;
            }
        }
    }
    if let Some(controller) = game.choice_controller() {
        return controller;
    }
    if let Some(grant) = game.current_grant() {
        return grant.player();
    }
    if let Some(pending) = &game.pending_spell {
        if game.pending_decisions_outstanding() {
            return pending.controller;
        }
    }
    if game.phase == Phase::Cleanup
        && game.players[game.active].hand.len() > game.max_hand_size
    {
        return game.active;
    }
    game.priority.unwrap_or(game.active)
}

/// Applies actions and drives the post-action loop.
pub struct ActionDispatcher<'a> {
    pub game: &'a mut Game,
    pub handler: &'a dyn AbilityHandler,
    pub mana: &'a dyn ManaSystem,
    pub evaluator: &'a dyn CardEvaluator,
    pub weights: &'a RewardWeights,
    /// The seat rewards are shaped for.
    pub agent: PlayerId,
}

impl ActionDispatcher<'_> {
    /// Apply one action for the current decision player.
    pub fn apply(&mut self, index: u16, context: &ActionContext) -> StepResult {
        let actor = decision_player(self.game);

        let Some(kind) = ActionKind::decode(index) else {
            return self.rejection(ActionError::OutOfRange(index));
        };
        let mask =
            ActionMaskGenerator::generate(self.game, self.handler, self.mana, actor);
        if !mask.allowed(index) {
            return self.rejection(ActionError::MaskMiss(index));
        }

        let before = StateSnapshot::capture(self.game);
        let snapshot = bincode::serialize(&*self.game).ok();

        let dispatched = catch_unwind(AssertUnwindSafe(|| {
            self.dispatch(actor, kind, context)
        }));

        let handler_reward = match dispatched {
            Err(_) => {
                warn!(index, "handler panicked; rolling back");
                if let Some(bytes) = snapshot {
                    if let Ok(restored) = bincode::deserialize::<Game>(&bytes) {
                        *self.game = restored;
                    }
                }
                self.game.error_flagged = true;
                return self.finish(
                    self.weights.mask_miss_penalty,
                    Some(ActionError::CriticalError.to_string()),
                );
            }
            Ok(Err(err)) => {
                debug!(index, %err, "action rejected");
                self.game.noop_streak += 1;
                return self.finish(self.weights.mask_miss_penalty, Some(err.to_string()));
            }
            Ok(Ok(reward)) => reward,
        };

        if matches!(kind, ActionKind::NoOp | ActionKind::NoOpSearchFail) {
            self.game.noop_streak += 1;
        } else {
            self.game.noop_streak = 0;
        }

        self.post_action_loop();
        self.game.recover_if_stuck(self.handler);

        let after = StateSnapshot::capture(self.game);
        let shaped = before.shaped_delta(&after, self.weights, self.agent);
        let terminal = if self.game.is_over() {
            match self.game.outcome_for(self.agent) {
                GameOutcome::Win => self.weights.win,
                GameOutcome::Loss => self.weights.loss,
                _ => 0.0,
            }
        } else {
            0.0
        };

        self.finish(handler_reward + shaped + terminal, None)
    }

    fn rejection(&mut self, err: ActionError) -> StepResult {
        // Observable state stays untouched on a rejection; only the
        // idle-streak counter moves, feeding stuck detection.
        self.game.noop_streak += 1;
        self.finish(self.weights.mask_miss_penalty, Some(err.to_string()))
    }

    fn finish(&mut self, reward: f32, error_message: Option<String>) -> StepResult {
        let done = self.game.is_over();
        let truncated = self.game.truncated;
        let next = decision_player(self.game);
        let action_mask =
            ActionMaskGenerator::generate(self.game, self.handler, self.mana, next);
        let game_result = if done || truncated {
            Some(self.game.outcome_for(self.agent))
        } else {
            None
        };
        StepResult {
            reward,
            done,
            truncated,
            info: StepInfo {
                action_mask,
                decision_player: next,
                game_result,
                error_message,
                turn: self.game.turn,
                phase: self.game.phase,
            },
        }
    }

    /// SBAs → triggers → stack resolution, until quiescent.
    fn post_action_loop(&mut self) {
        for iteration in 0..POST_ACTION_ITERATIONS {
            let mut progress = false;

            for _ in 0..POST_ACTION_ITERATIONS {
                if self.game.run_sbas(self.handler) {
                    progress = true;
                } else {
                    break;
                }
            }
            if self.game.is_over() {
                return;
            }

            if self.game.drain_triggers_to_stack() {
                progress = true;
            }

            if self.game.both_passed()
                && !self.game.stack.is_empty()
                && !self.game.stack.split_second_active()
                && self.game.resolve_top_of_stack(self.handler)
            {
                progress = true;
            }

            if !progress {
                return;
            }
            if iteration + 1 == POST_ACTION_ITERATIONS {
                warn!("post-action loop hit its safety bound");
            }
        }
    }

    // === The exhaustive dispatch ===

    #[allow(clippy::too_many_lines)]
    fn dispatch(
        &mut self,
        actor: PlayerId,
        kind: ActionKind,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        match kind {
            ActionKind::NoOp => {
                // A NO_OP offered under a grant (empty zone, nothing to
                // copy) consumes it so the queue cannot wedge.
                if self
                    .game
                    .current_grant()
                    .is_some_and(|g| g.player() == actor)
                {
                    self.game.consume_grant();
                }
                Ok(0.0)
            }

            // === Phase controls ===
            ActionKind::EndTurn => {
                let start_turn = self.game.turn;
                let mut guard = 0;
                while self.game.turn == start_turn
                    && self.game.phase != Phase::EndStep
                    && !self.game.is_over()
                    && guard < 16
                {
                    self.game.advance(self.handler);
                    guard += 1;
                }
                Ok(0.0)
            }
            ActionKind::UntapNext
            | ActionKind::DrawNext
            | ActionKind::MainPhaseEnd
            | ActionKind::UpkeepPass
            | ActionKind::BeginCombatEnd
            | ActionKind::EndCombat
            | ActionKind::EndStep => {
                self.game.advance(self.handler);
                Ok(0.0)
            }
            ActionKind::PassPriority => self.pass_action(actor),
            ActionKind::Concede => {
                self.game.flag_loss(actor);
                Ok(0.0)
            }

            // === Mulligans ===
            ActionKind::Mulligan => {
                if self.game.take_mulligan(actor) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "mulligan" })
                }
            }
            ActionKind::KeepHand => {
                self.game.keep_hand(actor);
                if self.game.mulligans_complete() {
                    self.game.begin_first_turn(self.handler);
                }
                Ok(0.0)
            }
            ActionKind::BottomCard { hand_idx } => {
                if !self.game.bottom_card(actor, hand_idx) {
                    return Err(ActionError::InvalidContext { field: "hand_idx" });
                }
                if self.game.mulligans_complete() {
                    self.game.begin_first_turn(self.handler);
                }
                Ok(0.0)
            }

            // === Lands and ordinary casts ===
            ActionKind::PlayLand { hand_idx } => {
                let card = self
                    .game
                    .hand_card(actor, hand_idx)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                if self.game.play_land(self.handler, actor, card, false) {
                    Ok(0.01)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            ActionKind::PlayMdfcLandBack { hand_idx } => {
                let card = self
                    .game
                    .hand_card(actor, hand_idx)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                if self.game.play_land(self.handler, actor, card, true) {
                    Ok(0.01)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            ActionKind::PlaySpell { hand_idx } => {
                self.cast_from_hand(actor, hand_idx, CastMethod::Normal)
            }
            ActionKind::PlayMdfcBack { hand_idx } => {
                self.cast_from_hand(actor, hand_idx, CastMethod::MdfcBack)
            }
            ActionKind::PlayAdventure { hand_idx } => {
                self.cast_from_hand(actor, hand_idx, CastMethod::Adventure)
            }
            ActionKind::CastLeftHalf => {
                let idx = ctx
                    .hand_idx()
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                self.cast_from_hand(actor, idx, CastMethod::LeftHalf)
            }
            ActionKind::CastRightHalf => {
                let idx = ctx
                    .hand_idx()
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                self.cast_from_hand(actor, idx, CastMethod::RightHalf)
            }
            ActionKind::CastFuse => {
                let idx = ctx
                    .hand_idx()
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                self.cast_from_hand(actor, idx, CastMethod::Fuse)
            }
            ActionKind::AftermathCast => {
                let idx = ctx
                    .graveyard_idx()
                    .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })?;
                let card = self
                    .game
                    .graveyard_card(actor, idx)
                    .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })?;
                self.begin_cast_checked(actor, card, CastMethod::Aftermath, CastExtras::default())
            }
            ActionKind::CastFromExile { exile_idx } => {
                let card = *self
                    .game
                    .castable_from_exile(actor)
                    .get(exile_idx)
                    .ok_or(ActionError::InvalidContext { field: "exile_idx" })?;
                self.begin_cast_checked(actor, card, CastMethod::FromExile, CastExtras::default())
            }
            ActionKind::CastForImpending => {
                let idx = ctx
                    .hand_idx()
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                self.cast_from_hand(actor, idx, CastMethod::Impending)
            }

            // === Graveyard/window alternative casts ===
            ActionKind::GraveCast(method) => self.grave_cast(actor, method, ctx),

            // === The 205–223 mechanic block ===
            ActionKind::AltCast(mechanic) => self.alt_cast(actor, mechanic, ctx),

            // === Pending-spell decisions ===
            ActionKind::PayKicker { pay } => {
                if !self.game.pending_pay_kicker(self.mana, pay) {
                    return Err(ActionError::CostPaymentFailed);
                }
                self.game.advance_pending_cast(self.handler, self.mana);
                Ok(0.0)
            }
            ActionKind::PayAdditional { pay } => {
                if !self.game.pending_pay_additional(pay) {
                    return Err(ActionError::InvalidContext { field: "additional" });
                }
                self.game.advance_pending_cast(self.handler, self.mana);
                Ok(0.0)
            }
            ActionKind::PayEscalate => {
                let extra = match ctx {
                    ActionContext::Escalate { extra_modes } => *extra_modes,
                    _ => 1,
                };
                if !self.game.pending_pay_escalate(extra) {
                    return Err(ActionError::InvalidContext { field: "escalate" });
                }
                self.game.advance_pending_cast(self.handler, self.mana);
                Ok(0.0)
            }
            ActionKind::PayOffspringCost => {
                if !self.game.pending_pay_offspring() {
                    return Err(ActionError::CostPaymentFailed);
                }
                self.game.advance_pending_cast(self.handler, self.mana);
                Ok(0.0)
            }
            ActionKind::SelectSpreeMode { mode_idx, .. } => {
                if !self.game.pending_select_spree_mode(mode_idx) {
                    return Err(ActionError::InvalidContext { field: "mode_idx" });
                }
                self.game.advance_pending_cast(self.handler, self.mana);
                Ok(0.0)
            }

            // === Choice sub-protocols ===
            ActionKind::SelectTarget { choice_idx } => {
                if self.game.select_target(self.handler, choice_idx) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "choice_idx" })
                }
            }
            ActionKind::SacrificePermanent { choice_idx } => {
                if !self.game.select_sacrifice(self.handler, choice_idx) {
                    return Err(ActionError::InvalidContext { field: "choice_idx" });
                }
                if self.game.sacrifice.is_none() && self.game.pending_spell.is_some() {
                    self.game.advance_pending_cast(self.handler, self.mana);
                }
                Ok(0.0)
            }
            ActionKind::ChooseMode { mode_idx } => {
                if !self.game.choose_mode(mode_idx) {
                    return Err(ActionError::InvalidContext { field: "mode_idx" });
                }
                if self.game.choice.is_none() {
                    self.game.advance_pending_cast(self.handler, self.mana);
                }
                Ok(0.0)
            }
            ActionKind::ChooseX { x } => {
                if self.game.choose_x(self.mana, x) {
                    Ok(0.0)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            ActionKind::ChooseColor { color_idx } => {
                if self.game.choose_color(color_idx) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "color_idx" })
                }
            }
            ActionKind::PutOnTop => {
                if self.game.scry_put_on_top(self.handler) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "scry" })
                }
            }
            ActionKind::PutOnBottom => {
                if self.game.scry_put_on_bottom(self.handler) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "scry" })
                }
            }
            ActionKind::PutToGraveyard => {
                if self.game.surveil_put_in_graveyard(self.handler) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "surveil" })
                }
            }

            // === Draw replacement ===
            ActionKind::Dredge => {
                let idx = ctx
                    .graveyard_idx()
                    .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })?;
                let card = self
                    .game
                    .graveyard_card(actor, idx)
                    .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })?;
                if self.game.do_dredge(self.handler, actor, card) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "dredge" })
                }
            }

            // === Discards ===
            ActionKind::DiscardCard { hand_idx } => self.discard_action(actor, hand_idx),

            // === Combat ===
            ActionKind::Attack { battlefield_idx } => {
                let card = self
                    .game
                    .battlefield_card(actor, battlefield_idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                if self.game.declare_attacker(self.handler, card) {
                    Ok(0.01)
                } else {
                    Err(ActionError::InvalidContext { field: "attacker" })
                }
            }
            ActionKind::AttackPlaneswalker { rel_idx } => {
                if self.game.attack_planeswalker(rel_idx) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "rel_idx" })
                }
            }
            ActionKind::AttackBattle { rel_idx } => {
                if self.game.attack_battle(rel_idx) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "rel_idx" })
                }
            }
            ActionKind::Block { battlefield_idx } => {
                let blocker = self
                    .game
                    .battlefield_card(actor, battlefield_idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                let attacker = match ctx {
                    ActionContext::Block { attacker_idx } => {
                        self.game.combat.attackers.get(*attacker_idx).copied()
                    }
                    _ => None,
                };
                if self.game.declare_blocker(self.handler, blocker, attacker) {
                    Ok(0.01)
                } else {
                    Err(ActionError::InvalidContext { field: "blocker" })
                }
            }
            ActionKind::AssignMultipleBlockers { attacker_idx } => {
                if self.game.arm_multi_block(attacker_idx) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "attacker_idx" })
                }
            }
            ActionKind::DefendBattle => {
                let (battle_idx, defender_idx) = match ctx {
                    ActionContext::DefendBattle {
                        battle_idx,
                        defender_idx,
                    } => (*battle_idx, *defender_idx),
                    _ => return Err(ActionError::InvalidContext { field: "battle_idx" }),
                };
                let battle = *self
                    .game
                    .defending_battles()
                    .get(battle_idx)
                    .ok_or(ActionError::InvalidContext { field: "battle_idx" })?;
                let defender = self
                    .game
                    .battlefield_card(actor, defender_idx)
                    .ok_or(ActionError::InvalidContext { field: "defender_idx" })?;
                if self.game.defend_battle(self.handler, battle, defender) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "defender" })
                }
            }
            ActionKind::CombatSub(sub) => self.combat_sub(actor, sub, ctx),

            // === Mana and abilities ===
            ActionKind::TapLandForMana { battlefield_idx } => {
                self.tap_for_mana(actor, battlefield_idx)
            }
            ActionKind::TapLandForEffect { battlefield_idx } => {
                self.tap_for_effect(actor, battlefield_idx)
            }
            ActionKind::ActivateAbility {
                battlefield_idx,
                ability_idx,
            } => self.activate_ability(actor, battlefield_idx, ability_idx),

            // === Face and attachment manipulation ===
            ActionKind::Transform { battlefield_idx } => {
                let card = self
                    .game
                    .battlefield_card(actor, battlefield_idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                let can = self
                    .game
                    .card_data(card)
                    .is_some_and(|d| d.layout == CardLayout::Transform);
                if !can {
                    return Err(ActionError::InvalidContext { field: "layout" });
                }
                if let Some(instance) = self.game.store.get_mut(card) {
                    instance.transformed = !instance.transformed;
                }
                Ok(0.0)
            }
            ActionKind::FlipCard => {
                let idx = match ctx {
                    ActionContext::Battlefield { battlefield_idx } => *battlefield_idx,
                    _ => return Err(ActionError::InvalidContext { field: "battlefield_idx" }),
                };
                let card = self
                    .game
                    .battlefield_card(actor, idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                if let Some(instance) = self.game.store.get_mut(card) {
                    instance.transformed = true;
                }
                Ok(0.0)
            }
            ActionKind::Morph => self.turn_face_up(actor, ctx, true),
            ActionKind::Manifest => self.turn_face_up(actor, ctx, false),
            ActionKind::Equip => self.attach(actor, ctx, false),
            ActionKind::Fortify => self.attach(actor, ctx, true),
            ActionKind::Reconfigure => self.reconfigure(actor, ctx),
            ActionKind::UnlockDoor { battlefield_idx } => self.unlock_door(actor, battlefield_idx),
            ActionKind::LevelUpClass { battlefield_idx } => {
                self.level_up(actor, battlefield_idx)
            }

            // === Grant-driven effect actions ===
            ActionKind::SearchLibrary(category) => self.search_library(actor, category),
            ActionKind::NoOpSearchFail => {
                if matches!(
                    self.game.current_grant(),
                    Some(EffectGrant::SearchLibrary { .. })
                ) {
                    self.game.consume_grant();
                    self.game.rng_shuffle_library(actor);
                }
                Ok(0.0)
            }
            ActionKind::CreateToken { token_idx } => {
                let Some(EffectGrant::CreateToken { count, .. }) =
                    self.game.current_grant().cloned()
                else {
                    return Err(ActionError::InvalidContext { field: "grant" });
                };
                self.game.consume_grant();
                let kind = TokenKind::ALL
                    .get(token_idx)
                    .copied()
                    .ok_or(ActionError::InvalidContext { field: "token_idx" })?;
                for _ in 0..count.max(1) {
                    self.game.create_token(self.handler, kind, actor);
                }
                Ok(0.01)
            }
            ActionKind::CopyPermanent => self.copy_permanent(actor, ctx),
            ActionKind::CopySpell => {
                let stack_idx = match ctx {
                    ActionContext::Spell { stack_idx } => *stack_idx,
                    _ => return Err(ActionError::InvalidContext { field: "stack_idx" }),
                };
                if !matches!(self.game.current_grant(), Some(EffectGrant::CopySpell { .. })) {
                    return Err(ActionError::InvalidContext { field: "grant" });
                }
                let id = self
                    .game
                    .stack
                    .items()
                    .get(stack_idx)
                    .map(|i| i.id)
                    .ok_or(ActionError::InvalidContext { field: "stack_idx" })?;
                self.game.consume_grant();
                self.game.stack.copy_item(id);
                Ok(0.01)
            }
            ActionKind::Populate => {
                if !matches!(self.game.current_grant(), Some(EffectGrant::Populate { .. })) {
                    return Err(ActionError::InvalidContext { field: "grant" });
                }
                let token_id = self.game.players[actor]
                    .battlefield
                    .iter()
                    .find(|&&c| self.game.instance(c).is_some_and(|i| i.is_token))
                    .and_then(|&c| self.game.instance(c).map(|i| i.card_id));
                let Some(token_id) = token_id else {
                    return Err(ActionError::InvalidContext { field: "token" });
                };
                self.game.consume_grant();
                self.game.create_token_of(self.handler, token_id, actor);
                Ok(0.01)
            }
            ActionKind::AddCounter { target_idx } => self.add_counter(actor, target_idx, ctx),
            ActionKind::RemoveCounter { target_idx } => {
                self.remove_counter(actor, target_idx, ctx)
            }
            ActionKind::Proliferate => {
                if !matches!(
                    self.game.current_grant(),
                    Some(EffectGrant::Proliferate { .. })
                ) {
                    return Err(ActionError::InvalidContext { field: "grant" });
                }
                self.game.consume_grant();
                self.game.proliferate(actor);
                Ok(0.01)
            }
            ActionKind::ReturnFromGraveyard { graveyard_idx } => {
                self.grant_zone_move(
                    actor,
                    graveyard_idx,
                    Zone::Graveyard,
                    Zone::Hand,
                    |g| matches!(g, EffectGrant::ReturnFromGraveyard { .. }),
                )
            }
            ActionKind::Reanimate { graveyard_idx } => self.grant_zone_move(
                actor,
                graveyard_idx,
                Zone::Graveyard,
                Zone::Battlefield,
                |g| matches!(g, EffectGrant::Reanimate { .. }),
            ),
            ActionKind::ReturnFromExile { exile_idx } => self.grant_zone_move(
                actor,
                exile_idx,
                Zone::Exile,
                Zone::Hand,
                |g| matches!(g, EffectGrant::ReturnFromExile { .. }),
            ),
            ActionKind::Clash => {
                if !matches!(self.game.current_grant(), Some(EffectGrant::Clash { .. })) {
                    return Err(ActionError::InvalidContext { field: "grant" });
                }
                self.game.consume_grant();
                let mine = self.top_cmc(actor);
                let theirs = self.top_cmc(actor.opponent());
                Ok(if mine > theirs { 0.05 } else { 0.0 })
            }

            // === Stack responses and copies ===
            ActionKind::Response(response) => self.response(actor, response, ctx),
            ActionKind::Conspire => self.conspire(actor, ctx),
            ActionKind::Grandeur => self.grandeur(actor, ctx),

            // === Remaining mechanics ===
            ActionKind::Mechanic(mechanic) => self.mechanic(actor, mechanic, ctx),
        }
    }

    // === Dispatch helpers ===

    fn pass_action(&mut self, actor: PlayerId) -> Result<f32, ActionError> {
        // A pass inside a sub-protocol finalises it.
        if self.game.targeting.is_some() {
            if !self.game.finalize_targeting() {
                // Minimum unmet and no candidates: abort the item.
                let item = self.game.targeting.as_ref().map(|t| t.item);
                self.game.targeting = None;
                if let Some(item) = item {
                    self.game.counter_stack_item(self.handler, item);
                }
                if self.game.stack.is_empty() {
                    self.game.leave_subphase();
                } else {
                    self.game.phase = Phase::Priority;
                }
            }
            return Ok(0.0);
        }
        if self.game.choice.is_some() {
            if self.game.finalize_modes() {
                self.game.advance_pending_cast(self.handler, self.mana);
                return Ok(0.0);
            }
            if self
                .game
                .choice
                .as_ref()
                .is_some_and(|c| matches!(c.kind, crate::choices::ChoiceKind::XValue))
            {
                // Passing is X = 0.
                self.game.choose_x(self.mana, 0);
                return Ok(0.0);
            }
            return Ok(0.0);
        }
        self.game.pass_priority(self.handler, actor);
        Ok(0.0)
    }

    fn cast_from_hand(
        &mut self,
        actor: PlayerId,
        hand_idx: usize,
        method: CastMethod,
    ) -> Result<f32, ActionError> {
        let card = self
            .game
            .hand_card(actor, hand_idx)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        self.begin_cast_checked(actor, card, method, CastExtras::default())
    }

    fn begin_cast_checked(
        &mut self,
        actor: PlayerId,
        card: CardHandle,
        method: CastMethod,
        extras: CastExtras,
    ) -> Result<f32, ActionError> {
        if self
            .game
            .begin_cast(self.handler, self.mana, actor, card, method, &extras)
        {
            Ok(0.02)
        } else {
            Err(ActionError::CostPaymentFailed)
        }
    }

    fn grave_cast(
        &mut self,
        actor: PlayerId,
        method: GraveCast,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        let mut extras = CastExtras::default();
        let (card, cast_method) = match method {
            GraveCast::Flashback => (
                self.gy_card(actor, ctx)?,
                CastMethod::Flashback,
            ),
            GraveCast::JumpStart => {
                if let ActionContext::AltCast {
                    discard_hand_idx, ..
                } = ctx
                {
                    extras.discard_hand_idx = *discard_hand_idx;
                }
                if extras.discard_hand_idx.is_none() {
                    // Default: discard the first other card in hand.
                    extras.discard_hand_idx =
                        (!self.game.players[actor].hand.is_empty()).then_some(0);
                }
                (self.gy_card(actor, ctx)?, CastMethod::JumpStart)
            }
            GraveCast::Escape => {
                let card = self.gy_card(actor, ctx)?;
                if let ActionContext::AltCast {
                    exile_graveyard_idxs,
                    ..
                } = ctx
                {
                    for &idx in exile_graveyard_idxs {
                        if let Some(fodder) = self.game.graveyard_card(actor, idx) {
                            if fodder != card {
                                extras.exile_from_graveyard.push(fodder);
                            }
                        }
                    }
                }
                if extras.exile_from_graveyard.is_empty() {
                    // Default fodder: the bottom cards of the graveyard.
                    extras.exile_from_graveyard = self.game.players[actor]
                        .graveyard
                        .iter()
                        .rev()
                        .copied()
                        .filter(|&c| c != card)
                        .take(2)
                        .collect();
                }
                if extras.exile_from_graveyard.is_empty() {
                    return Err(ActionError::CostPaymentFailed);
                }
                (card, CastMethod::Escape)
            }
            GraveCast::Madness => {
                let card = self
                    .game
                    .madness_window
                    .ok_or(ActionError::InvalidContext { field: "madness" })?;
                (card, CastMethod::Madness)
            }
            GraveCast::Overload => (self.hand_card_ctx(actor, ctx)?, CastMethod::Overload),
            GraveCast::Emerge => {
                let card = self.hand_card_ctx(actor, ctx)?;
                if let ActionContext::AltCast {
                    sacrifice_battlefield_idx: Some(idx),
                    ..
                } = ctx
                {
                    extras.sacrifice = self.game.battlefield_card(actor, *idx);
                }
                if extras.sacrifice.is_none() {
                    extras.sacrifice = self.game.players[actor]
                        .battlefield
                        .iter()
                        .copied()
                        .find(|&c| self.game.is_creature(c));
                }
                (card, CastMethod::Emerge)
            }
            GraveCast::Delve => {
                let card = self.hand_card_ctx(actor, ctx)?;
                if let ActionContext::AltCast {
                    exile_graveyard_idxs,
                    ..
                } = ctx
                {
                    for &idx in exile_graveyard_idxs {
                        if let Some(fodder) = self.game.graveyard_card(actor, idx) {
                            extras.exile_from_graveyard.push(fodder);
                        }
                    }
                }
                (card, CastMethod::Delve)
            }
        };
        self.begin_cast_checked(actor, card, cast_method, extras)
    }

    fn alt_cast(
        &mut self,
        actor: PlayerId,
        mechanic: AltMechanic,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        match mechanic {
            AltMechanic::Foretell => {
                let card = self.hand_card_ctx(actor, ctx)?;
                if self.game.foretell(self.handler, self.mana, actor, card) {
                    Ok(0.01)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            AltMechanic::Suspend => {
                let card = self.hand_card_ctx(actor, ctx)?;
                if self.game.suspend(self.handler, self.mana, actor, card) {
                    Ok(0.01)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            AltMechanic::Partner | AltMechanic::Companion => {
                let keyword = if mechanic == AltMechanic::Partner {
                    Keyword::Partner
                } else {
                    Keyword::Companion
                };
                let card = self.game.players[actor]
                    .exile
                    .iter()
                    .copied()
                    .find(|&c| {
                        self.game
                            .card_data(c)
                            .is_some_and(|d| d.has_keyword(keyword))
                    })
                    .ok_or(ActionError::InvalidContext { field: "companion" })?;
                self.mana
                    .pay(self.game, actor, &ManaCost::generic(3), 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                self.game
                    .move_card(self.handler, card, Zone::Hand, ZonePlacement::Top, None)
                    .map_err(|_| ActionError::ResolutionFailed)?;
                Ok(0.01)
            }
            AltMechanic::Reinforce => {
                let (hand_idx, target_idx) = match ctx {
                    ActionContext::Attach {
                        source_idx,
                        target_idx,
                    } => (*source_idx, *target_idx),
                    ActionContext::Hand { hand_idx } => (*hand_idx, 0),
                    _ => return Err(ActionError::InvalidContext { field: "hand_idx" }),
                };
                let card = self
                    .game
                    .hand_card(actor, hand_idx)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Reinforce))
                    .ok_or(ActionError::InvalidContext { field: "reinforce" })?;
                let target = self
                    .game
                    .battlefield_card(actor, target_idx)
                    .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                self.game
                    .discard(self.handler, actor, card)
                    .map_err(|_| ActionError::ResolutionFailed)?;
                if let Some(instance) = self.game.store.get_mut(target) {
                    instance.add_counters(CounterKind::PlusOnePlusOne, 1);
                }
                Ok(0.01)
            }
            AltMechanic::Channel | AltMechanic::Transmute => {
                let card = self.hand_card_ctx(actor, ctx)?;
                let keyword = if mechanic == AltMechanic::Channel {
                    Keyword::Channel
                } else {
                    Keyword::Transmute
                };
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(keyword))
                    .ok_or(ActionError::InvalidContext { field: "keyword" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                let in_graveyard = self
                    .game
                    .discard(self.handler, actor, card)
                    .map_err(|_| ActionError::ResolutionFailed)?;
                if mechanic == AltMechanic::Transmute {
                    self.game
                        .push_grant(EffectGrant::SearchLibrary { player: actor });
                } else {
                    // Channel: the discarded card's ability resolves.
                    self.game.stack.push(
                        StackItemKind::Ability {
                            source: in_graveyard,
                            ability_idx: 0,
                        },
                        actor,
                        SpellContext::default(),
                    );
                    self.game.assign_priority(actor);
                }
                Ok(0.01)
            }
            AltMechanic::Forecast => {
                let card = self.hand_card_ctx(actor, ctx)?;
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Forecast))
                    .ok_or(ActionError::InvalidContext { field: "forecast" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                self.game.stack.push(
                    StackItemKind::Ability {
                        source: card,
                        ability_idx: 0,
                    },
                    actor,
                    SpellContext::default(),
                );
                self.game.assign_priority(actor);
                Ok(0.01)
            }
            _ => {
                // Zone-sourced alternative casting costs.
                let method = match mechanic {
                    AltMechanic::Disturb => CastMethod::Disturb,
                    AltMechanic::Dash => CastMethod::Dash,
                    AltMechanic::Spectacle => CastMethod::Spectacle,
                    AltMechanic::Bestow => CastMethod::Bestow,
                    AltMechanic::Blitz => CastMethod::Blitz,
                    AltMechanic::Eternalize => CastMethod::Eternalize,
                    AltMechanic::Embalm => CastMethod::Embalm,
                    AltMechanic::Unearth => CastMethod::Unearth,
                    AltMechanic::Encore => CastMethod::Encore,
                    AltMechanic::Evoke => CastMethod::Evoke,
                    AltMechanic::Miracle => CastMethod::Miracle,
                    _ => CastMethod::Normal,
                };
                let card = if method.casts_from_graveyard() {
                    self.gy_card(actor, ctx)?
                } else {
                    self.hand_card_ctx(actor, ctx)?
                };
                self.begin_cast_checked(actor, card, method, CastExtras::default())
            }
        }
    }

    fn discard_action(&mut self, actor: PlayerId, hand_idx: usize) -> Result<f32, ActionError> {
        let card = self
            .game
            .hand_card(actor, hand_idx)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;

        if let Some(EffectGrant::Discard { count, .. }) = self.game.current_grant().cloned() {
            self.game
                .discard(self.handler, actor, card)
                .map_err(|_| ActionError::ResolutionFailed)?;
            self.game.consume_grant();
            if count > 1 {
                self.game.push_grant(EffectGrant::Discard {
                    player: actor,
                    count: count - 1,
                });
            }
            return Ok(0.0);
        }

        if self.game.phase == Phase::Cleanup {
            self.game
                .discard(self.handler, actor, card)
                .map_err(|_| ActionError::ResolutionFailed)?;
            self.game.continue_cleanup(self.handler);
            return Ok(0.0);
        }

        Err(ActionError::InvalidContext { field: "discard" })
    }

    fn tap_for_mana(&mut self, actor: PlayerId, idx: usize) -> Result<f32, ActionError> {
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let produce = self
            .game
            .card_data(card)
            .and_then(|d| d.abilities.iter().find_map(|a| a.produces))
            .ok_or(ActionError::InvalidContext { field: "mana_ability" })?;
        if self.game.players[actor].is_tapped(card) {
            return Err(ActionError::CostPaymentFailed);
        }
        self.game.players[actor].tap(card);
        match produce {
            ManaProduce::Color(color) => self.game.players[actor].pool.add(color),
            ManaProduce::Colorless => self.game.players[actor].pool.add_colorless(),
        }
        Ok(0.0)
    }

    fn tap_for_effect(&mut self, actor: PlayerId, idx: usize) -> Result<f32, ActionError> {
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let ability_idx = self
            .handler
            .activated_abilities(self.game, card)
            .iter()
            .position(|a| a.tap_cost && !a.is_mana_ability())
            .ok_or(ActionError::InvalidContext { field: "ability" })?;
        if self.game.players[actor].is_tapped(card) {
            return Err(ActionError::CostPaymentFailed);
        }
        self.game.players[actor].tap(card);
        self.game.stack.push(
            StackItemKind::Ability {
                source: card,
                ability_idx: ability_idx as u8,
            },
            actor,
            SpellContext::default(),
        );
        if self.game.phase.is_turn_phase() {
            self.game.enter_subphase(Phase::Priority);
        }
        self.game.assign_priority(actor);
        Ok(0.0)
    }

    fn activate_ability(
        &mut self,
        actor: PlayerId,
        battlefield_idx: usize,
        ability_idx: u8,
    ) -> Result<f32, ActionError> {
        let card = self
            .game
            .battlefield_card(actor, battlefield_idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let abilities = self.handler.activated_abilities(self.game, card);
        let ability = abilities
            .get(ability_idx as usize)
            .ok_or(ActionError::InvalidContext { field: "ability_idx" })?
            .clone();

        if ability.tap_cost && self.game.players[actor].is_tapped(card) {
            return Err(ActionError::CostPaymentFailed);
        }
        self.mana
            .pay(self.game, actor, &ability.cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;
        if ability.tap_cost {
            self.game.players[actor].tap(card);
        }

        if let Some(produce) = ability.produces {
            match produce {
                ManaProduce::Color(color) => self.game.players[actor].pool.add(color),
                ManaProduce::Colorless => self.game.players[actor].pool.add_colorless(),
            }
            return Ok(0.0);
        }

        self.game.stack.push(
            StackItemKind::Ability {
                source: card,
                ability_idx,
            },
            actor,
            SpellContext::default(),
        );
        if self.game.phase.is_turn_phase() {
            self.game.enter_subphase(Phase::Priority);
        }
        self.game.assign_priority(actor);
        Ok(0.01)
    }

    fn turn_face_up(
        &mut self,
        actor: PlayerId,
        ctx: &ActionContext,
        morph: bool,
    ) -> Result<f32, ActionError> {
        let idx = match ctx {
            ActionContext::Battlefield { battlefield_idx } => *battlefield_idx,
            _ => return Err(ActionError::InvalidContext { field: "battlefield_idx" }),
        };
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let cost = if morph {
            self.game
                .card_data(card)
                .and_then(|d| d.keyword_cost(Keyword::Morph))
                .ok_or(ActionError::InvalidContext { field: "morph" })?
        } else {
            self.game
                .card_data(card)
                .map(|d| d.mana_cost)
                .ok_or(ActionError::InvalidContext { field: "manifest" })?
        };
        let eligible = self
            .game
            .instance(card)
            .is_some_and(|i| i.face_down && (if morph { i.morphed } else { i.manifested }));
        if !eligible {
            return Err(ActionError::InvalidContext { field: "face_down" });
        }
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;
        if let Some(instance) = self.game.store.get_mut(card) {
            instance.face_down = false;
            instance.morphed = false;
            instance.manifested = false;
        }
        Ok(0.01)
    }

    fn attach(
        &mut self,
        actor: PlayerId,
        ctx: &ActionContext,
        fortify: bool,
    ) -> Result<f32, ActionError> {
        let (source_idx, target_idx) = match ctx {
            ActionContext::Attach {
                source_idx,
                target_idx,
            } => (*source_idx, *target_idx),
            _ => return Err(ActionError::InvalidContext { field: "source_idx" }),
        };
        let source = self
            .game
            .battlefield_card(actor, source_idx)
            .ok_or(ActionError::InvalidContext { field: "source_idx" })?;
        let target = self
            .game
            .battlefield_card(actor, target_idx)
            .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
        if source == target {
            return Err(ActionError::InvalidContext { field: "target_idx" });
        }

        let target_ok = if fortify {
            self.game.card_data(target).is_some_and(|d| d.is_land())
        } else {
            self.game.is_creature(target)
        };
        if !target_ok {
            return Err(ActionError::InvalidContext { field: "target_idx" });
        }
        let cost = self
            .game
            .card_data(source)
            .and_then(|d| d.attach_cost)
            .ok_or(ActionError::InvalidContext { field: "attach_cost" })?;
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;
        self.game.players[actor].attachments.insert(source, target);
        Ok(0.01)
    }

    fn reconfigure(&mut self, actor: PlayerId, ctx: &ActionContext) -> Result<f32, ActionError> {
        let (source_idx, target_idx) = match ctx {
            ActionContext::Attach {
                source_idx,
                target_idx,
            } => (*source_idx, *target_idx),
            _ => return Err(ActionError::InvalidContext { field: "source_idx" }),
        };
        let source = self
            .game
            .battlefield_card(actor, source_idx)
            .ok_or(ActionError::InvalidContext { field: "source_idx" })?;
        let cost = self
            .game
            .card_data(source)
            .and_then(|d| d.keyword_cost(Keyword::Reconfigure))
            .ok_or(ActionError::InvalidContext { field: "reconfigure" })?;
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;

        if self.game.players[actor].attachments.contains_key(&source) {
            self.game.players[actor].attachments.remove(&source);
        } else {
            let target = self
                .game
                .battlefield_card(actor, target_idx)
                .filter(|&t| t != source && self.game.is_creature(t))
                .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
            self.game.players[actor].attachments.insert(source, target);
        }
        Ok(0.01)
    }

    fn unlock_door(&mut self, actor: PlayerId, idx: usize) -> Result<f32, ActionError> {
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let doors = self
            .game
            .instance(card)
            .map(|i| i.doors_unlocked)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        if doors >= 0b11 {
            return Err(ActionError::InvalidContext { field: "doors" });
        }
        let next_door = if doors & 1 == 0 { 0 } else { 1 };
        let cost = self
            .game
            .card_data(card)
            .and_then(|d| d.faces.get(next_door).map(|f| f.mana_cost))
            .ok_or(ActionError::InvalidContext { field: "door" })?;
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;
        if let Some(instance) = self.game.store.get_mut(card) {
            instance.doors_unlocked |= 1 << next_door;
        }
        Ok(0.01)
    }

    fn level_up(&mut self, actor: PlayerId, idx: usize) -> Result<f32, ActionError> {
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        let level = self
            .game
            .instance(card)
            .map(|i| i.level)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        if level == 0 || level >= 3 {
            return Err(ActionError::InvalidContext { field: "level" });
        }
        let cost = self
            .game
            .card_data(card)
            .and_then(|d| d.level_costs.get(usize::from(level - 1)).copied())
            .ok_or(ActionError::InvalidContext { field: "level_cost" })?;
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;
        if let Some(instance) = self.game.store.get_mut(card) {
            instance.level += 1;
        }
        Ok(0.01)
    }

    fn search_library(
        &mut self,
        actor: PlayerId,
        category: SearchCategory,
    ) -> Result<f32, ActionError> {
        if !matches!(
            self.game.current_grant(),
            Some(EffectGrant::SearchLibrary { .. })
        ) {
            return Err(ActionError::InvalidContext { field: "grant" });
        }
        self.game.consume_grant();

        let found = self.game.players[actor]
            .library
            .iter()
            .copied()
            .find(|&c| {
                let Some(data) = self.game.card_data(c) else {
                    return false;
                };
                match category {
                    SearchCategory::BasicLand => {
                        data.is_land()
                            && data.types.has_supertype(crate::cards::Supertype::Basic)
                    }
                    SearchCategory::Creature => data.is_creature(),
                    SearchCategory::Instant => data.types.has_type(CardType::Instant),
                    SearchCategory::Sorcery => data.types.has_type(CardType::Sorcery),
                    SearchCategory::Artifact => data.types.has_type(CardType::Artifact),
                }
            });

        if let Some(card) = found {
            let _ = self
                .game
                .move_card(self.handler, card, Zone::Hand, ZonePlacement::Top, None);
        }
        self.game.rng_shuffle_library(actor);
        Ok(if found.is_some() { 0.02 } else { 0.0 })
    }

    fn copy_permanent(&mut self, actor: PlayerId, ctx: &ActionContext) -> Result<f32, ActionError> {
        if !matches!(
            self.game.current_grant(),
            Some(EffectGrant::CopyPermanent { .. })
        ) {
            return Err(ActionError::InvalidContext { field: "grant" });
        }
        let target_idx = match ctx {
            ActionContext::CopyPermanent { target_idx } => *target_idx,
            _ => return Err(ActionError::InvalidContext { field: "target_idx" }),
        };
        let (player, idx) = if target_idx < BATTLEFIELD_SLOTS {
            (actor, target_idx)
        } else {
            (actor.opponent(), target_idx - BATTLEFIELD_SLOTS)
        };
        let card_id = self
            .game
            .battlefield_card(player, idx)
            .and_then(|c| self.game.instance(c).map(|i| i.card_id))
            .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
        self.game.consume_grant();
        self.game.create_token_of(self.handler, card_id, actor);
        Ok(0.01)
    }

    fn add_counter(
        &mut self,
        actor: PlayerId,
        target_idx: usize,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        let Some(EffectGrant::AddCounter { kind, count, .. }) =
            self.game.current_grant().cloned()
        else {
            return Err(ActionError::InvalidContext { field: "grant" });
        };
        let kind = match ctx {
            ActionContext::Counter { kind } => *kind,
            _ => kind,
        };
        let target = self
            .counter_target(actor, target_idx)
            .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
        self.game.consume_grant();
        if let Some(instance) = self.game.store.get_mut(target) {
            instance.add_counters(kind, i32::from(count.max(1)));
        }
        Ok(0.01)
    }

    fn remove_counter(
        &mut self,
        actor: PlayerId,
        target_idx: usize,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        if !matches!(
            self.game.current_grant(),
            Some(EffectGrant::RemoveCounter { .. })
        ) {
            return Err(ActionError::InvalidContext { field: "grant" });
        }
        let target = self
            .counter_target(actor, target_idx)
            .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
        let kind = match ctx {
            ActionContext::Counter { kind } => Some(*kind),
            _ => None,
        };
        let chosen = {
            let instance = self
                .game
                .instance(target)
                .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
            kind.filter(|k| instance.counter(*k) > 0)
                .or_else(|| instance.counters.keys().next().copied())
        };
        let Some(kind) = chosen else {
            return Err(ActionError::InvalidContext { field: "counter" });
        };
        self.game.consume_grant();
        if let Some(instance) = self.game.store.get_mut(target) {
            instance.add_counters(kind, -1);
        }
        Ok(0.01)
    }

    fn grant_zone_move(
        &mut self,
        actor: PlayerId,
        idx: usize,
        from: Zone,
        to: Zone,
        matches_grant: impl Fn(&EffectGrant) -> bool,
    ) -> Result<f32, ActionError> {
        if !self.game.current_grant().is_some_and(&matches_grant) {
            return Err(ActionError::InvalidContext { field: "grant" });
        }
        let card = match from {
            Zone::Graveyard => self.game.graveyard_card(actor, idx),
            Zone::Exile => self.game.exile_card(actor, idx),
            _ => None,
        }
        .ok_or(ActionError::InvalidContext { field: "zone_idx" })?;
        self.game.consume_grant();
        self.game
            .move_card(self.handler, card, to, ZonePlacement::Top, None)
            .map_err(|_| ActionError::ResolutionFailed)?;
        Ok(0.02)
    }

    fn response(
        &mut self,
        actor: PlayerId,
        response: ResponseAction,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        let (hand_idx, target_stack_idx) = match ctx {
            ActionContext::Response {
                hand_idx,
                target_stack_idx,
            } => (*hand_idx, *target_stack_idx),
            _ => return Err(ActionError::InvalidContext { field: "hand_idx" }),
        };
        let card = self
            .game
            .hand_card(actor, hand_idx)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        let card_id = self
            .game
            .instance(card)
            .map(|i| i.card_id)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        let role = self
            .handler
            .response_role(self.game, card_id)
            .ok_or(ActionError::InvalidContext { field: "response" })?;

        let target_id = self
            .game
            .stack
            .items()
            .get(target_stack_idx)
            .map(|i| i.id)
            .ok_or(ActionError::InvalidContext { field: "target_stack_idx" })?;

        let kind = match (response, role) {
            (ResponseAction::CounterSpell, ResponseRole::CounterSpell) => {
                ResponseKind::CounterSpell { target: target_id }
            }
            (ResponseAction::CounterAbility, ResponseRole::CounterAbility) => {
                ResponseKind::CounterAbility { target: target_id }
            }
            (ResponseAction::Stifle, ResponseRole::Stifle) => {
                ResponseKind::Stifle { target: target_id }
            }
            (ResponseAction::PreventDamage, ResponseRole::PreventDamage { amount }) => {
                ResponseKind::PreventDamage { amount }
            }
            (ResponseAction::RedirectDamage, ResponseRole::RedirectDamage) => {
                ResponseKind::RedirectDamage
            }
            _ => return Err(ActionError::InvalidContext { field: "response" }),
        };

        let cost = self
            .game
            .cast_cost(card_id, CastMethod::Normal, &CastExtras::default())
            .ok_or(ActionError::CostPaymentFailed)?;
        self.mana
            .pay(self.game, actor, &cost, 0)
            .map_err(|_| ActionError::CostPaymentFailed)?;

        let on_stack = self
            .game
            .move_card(self.handler, card, Zone::Stack, ZonePlacement::Top, None)
            .map_err(|_| ActionError::ResolutionFailed)?;
        let mut context = SpellContext::for_method(CastMethod::Normal, Zone::Hand);
        context.response = Some(kind);
        if matches!(
            kind,
            ResponseKind::CounterSpell { .. }
                | ResponseKind::CounterAbility { .. }
                | ResponseKind::Stifle { .. }
        ) {
            context.targets.push(crate::stack::TargetRef::StackItem(target_id));
            context.targets_chosen = true;
        }
        self.game.stack.push(
            StackItemKind::Spell {
                card: on_stack,
                card_id,
            },
            actor,
            context,
        );
        if self.game.phase.is_turn_phase() {
            self.game.enter_subphase(Phase::Priority);
        }
        self.game.assign_priority(actor);
        Ok(0.02)
    }

    fn conspire(&mut self, actor: PlayerId, ctx: &ActionContext) -> Result<f32, ActionError> {
        let (stack_idx, c1, c2) = match ctx {
            ActionContext::Conspire {
                stack_idx,
                creature1_idx,
                creature2_idx,
            } => (*stack_idx, *creature1_idx, *creature2_idx),
            _ => return Err(ActionError::InvalidContext { field: "stack_idx" }),
        };
        if c1 == c2 {
            return Err(ActionError::InvalidContext { field: "creature2_idx" });
        }
        let id = self
            .game
            .stack
            .items()
            .get(stack_idx)
            .map(|i| i.id)
            .ok_or(ActionError::InvalidContext { field: "stack_idx" })?;
        let first = self
            .game
            .battlefield_card(actor, c1)
            .ok_or(ActionError::InvalidContext { field: "creature1_idx" })?;
        let second = self
            .game
            .battlefield_card(actor, c2)
            .ok_or(ActionError::InvalidContext { field: "creature2_idx" })?;
        for card in [first, second] {
            if !self.game.is_creature(card) || self.game.players[actor].is_tapped(card) {
                return Err(ActionError::CostPaymentFailed);
            }
        }
        self.game.players[actor].tap(first);
        self.game.players[actor].tap(second);
        self.game.stack.copy_item(id);
        Ok(0.02)
    }

    fn grandeur(&mut self, actor: PlayerId, ctx: &ActionContext) -> Result<f32, ActionError> {
        let hand_idx = ctx
            .hand_idx()
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        let card = self
            .game
            .hand_card(actor, hand_idx)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        let card_id = self
            .game
            .instance(card)
            .map(|i| i.card_id)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        let source = self.game.players[actor]
            .battlefield
            .iter()
            .copied()
            .find(|&c| {
                self.game.instance(c).map(|i| i.card_id) == Some(card_id)
                    && self
                        .game
                        .card_data(c)
                        .is_some_and(|d| d.has_keyword(Keyword::Grandeur))
            })
            .ok_or(ActionError::InvalidContext { field: "grandeur" })?;

        self.game
            .discard(self.handler, actor, card)
            .map_err(|_| ActionError::ResolutionFailed)?;
        self.game.stack.push(
            StackItemKind::Ability {
                source,
                ability_idx: 0,
            },
            actor,
            SpellContext::default(),
        );
        if self.game.phase.is_turn_phase() {
            self.game.enter_subphase(Phase::Priority);
        }
        self.game.assign_priority(actor);
        Ok(0.01)
    }

    fn combat_sub(
        &mut self,
        actor: PlayerId,
        sub: CombatSubAction,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        match sub {
            CombatSubAction::FirstStrikeOrder => {
                if let ActionContext::DamageOrder {
                    attacker_idx,
                    order,
                } = ctx
                {
                    if !order.is_empty() {
                        let attacker = self
                            .game
                            .combat
                            .attackers
                            .get(*attacker_idx)
                            .copied()
                            .ok_or(ActionError::InvalidContext { field: "attacker_idx" })?;
                        let blockers = self
                            .game
                            .combat
                            .blocks
                            .get(&attacker)
                            .cloned()
                            .unwrap_or_default();
                        let explicit: Vec<CardHandle> = order
                            .iter()
                            .filter_map(|&i| blockers.get(i).copied())
                            .collect();
                        if self.game.set_damage_order(attacker, explicit) {
                            return Ok(0.0);
                        }
                        return Err(ActionError::InvalidContext { field: "order" });
                    }
                }
                self.game.default_damage_orders(self.evaluator);
                Ok(0.0)
            }
            CombatSubAction::AssignCombatDamage => {
                // Deal the current step's damage and move on.
                self.game.advance(self.handler);
                Ok(0.0)
            }
            CombatSubAction::Ninjutsu => {
                let (hand_idx, attacker_idx) = match ctx {
                    ActionContext::Ninjutsu {
                        hand_idx,
                        attacker_idx,
                    } => (*hand_idx, *attacker_idx),
                    _ => return Err(ActionError::InvalidContext { field: "hand_idx" }),
                };
                let ninja = self
                    .game
                    .hand_card(actor, hand_idx)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                let attacker = self
                    .game
                    .combat
                    .attackers
                    .get(attacker_idx)
                    .copied()
                    .or_else(|| {
                        self.game
                            .combat
                            .attackers
                            .iter()
                            .copied()
                            .find(|&a| !self.game.combat.is_blocked(a))
                    })
                    .ok_or(ActionError::InvalidContext { field: "attacker_idx" })?;
                if self.game.ninjutsu(self.handler, self.mana, ninja, attacker) {
                    Ok(0.02)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            CombatSubAction::DeclareAttackersDone => {
                if self.game.declare_attackers_done(self.handler) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "phase" })
                }
            }
            CombatSubAction::DeclareBlockersDone => {
                if self.game.declare_blockers_done(self.handler) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "menace" })
                }
            }
            CombatSubAction::LoyaltyPlus
            | CombatSubAction::LoyaltyMinus
            | CombatSubAction::LoyaltyZero
            | CombatSubAction::LoyaltyUltimate => self.loyalty(actor, sub, ctx),
            CombatSubAction::ProtectPlaneswalker => {
                let (pw_idx, defender_idx) = match ctx {
                    ActionContext::Protect {
                        planeswalker_idx,
                        defender_idx,
                    } => (*planeswalker_idx, *defender_idx),
                    _ => return Err(ActionError::InvalidContext { field: "planeswalker_idx" }),
                };
                let walkers: Vec<CardHandle> = self
                    .game
                    .combat
                    .targets
                    .values()
                    .filter_map(|t| match t {
                        crate::combat::AttackTarget::Planeswalker(w) => Some(*w),
                        _ => None,
                    })
                    .collect();
                let walker = *walkers
                    .get(pw_idx)
                    .ok_or(ActionError::InvalidContext { field: "planeswalker_idx" })?;
                let protector = self
                    .game
                    .battlefield_card(actor, defender_idx)
                    .ok_or(ActionError::InvalidContext { field: "defender_idx" })?;
                if self.game.protect_planeswalker(walker, protector) {
                    Ok(0.0)
                } else {
                    Err(ActionError::InvalidContext { field: "protector" })
                }
            }
        }
    }

    fn loyalty(
        &mut self,
        actor: PlayerId,
        sub: CombatSubAction,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        let idx = match ctx {
            ActionContext::Loyalty { battlefield_idx } => *battlefield_idx,
            _ => return Err(ActionError::InvalidContext { field: "battlefield_idx" }),
        };
        let card = self
            .game
            .battlefield_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
        if self.game.players[actor].activated_this_turn.contains(&card) {
            return Err(ActionError::CostPaymentFailed);
        }

        let abilities = self.handler.activated_abilities(self.game, card);
        let (ability_idx, delta) = abilities
            .iter()
            .enumerate()
            .find_map(|(i, a)| {
                let delta = a.loyalty_delta?;
                let wanted = match sub {
                    CombatSubAction::LoyaltyPlus => delta > 0 && !a.is_ultimate,
                    CombatSubAction::LoyaltyMinus => delta < 0 && !a.is_ultimate,
                    CombatSubAction::LoyaltyZero => delta == 0 && !a.is_ultimate,
                    CombatSubAction::LoyaltyUltimate => a.is_ultimate,
                    _ => false,
                };
                wanted.then_some((i, delta))
            })
            .ok_or(ActionError::InvalidContext { field: "loyalty" })?;

        let loyalty = self.game.instance(card).map_or(0, |i| i.loyalty());
        if i32::from(delta) < 0 && loyalty + i32::from(delta) < 0 {
            return Err(ActionError::CostPaymentFailed);
        }

        if let Some(instance) = self.game.store.get_mut(card) {
            instance.add_counters(CounterKind::Loyalty, i32::from(delta));
        }
        self.game.players[actor].activated_this_turn.insert(card);
        self.game.stack.push(
            StackItemKind::Ability {
                source: card,
                ability_idx: ability_idx as u8,
            },
            actor,
            SpellContext::default(),
        );
        if self.game.phase.is_turn_phase() {
            self.game.enter_subphase(Phase::Priority);
        }
        self.game.assign_priority(actor);
        Ok(0.01)
    }

    fn mechanic(
        &mut self,
        actor: PlayerId,
        mechanic: MechanicAction,
        ctx: &ActionContext,
    ) -> Result<f32, ActionError> {
        match mechanic {
            MechanicAction::Investigate => {
                self.game.create_token(self.handler, TokenKind::Clue, actor);
                Ok(0.01)
            }
            MechanicAction::Foretell => {
                let card = self.hand_card_ctx(actor, ctx)?;
                if self.game.foretell(self.handler, self.mana, actor, card) {
                    Ok(0.01)
                } else {
                    Err(ActionError::CostPaymentFailed)
                }
            }
            MechanicAction::Amass => {
                let army = self.game.players[actor]
                    .battlefield
                    .iter()
                    .copied()
                    .find(|&c| {
                        self.game
                            .type_line_of(c)
                            .is_some_and(|t| t.has_subtype("Army"))
                    });
                match army {
                    Some(existing) => {
                        if let Some(instance) = self.game.store.get_mut(existing) {
                            instance.add_counters(CounterKind::PlusOnePlusOne, 1);
                        }
                    }
                    None => {
                        let token = self.game.create_token(self.handler, TokenKind::Zombie, actor);
                        if let Some(instance) = self.game.store.get_mut(token) {
                            instance.add_counters(CounterKind::PlusOnePlusOne, 1);
                        }
                    }
                }
                Ok(0.01)
            }
            MechanicAction::Learn => {
                self.game.draw_card(self.handler, actor);
                self.game.push_grant(EffectGrant::Discard {
                    player: actor,
                    count: 1,
                });
                Ok(0.01)
            }
            MechanicAction::Venture => {
                // Dungeon progress is tracked as charge counters on the
                // venturing permanent; room effects are the ability
                // interpreter's concern.
                let source = self.game.players[actor]
                    .battlefield
                    .iter()
                    .copied()
                    .find(|&c| {
                        self.game
                            .card_data(c)
                            .is_some_and(|d| d.has_keyword(Keyword::Venture))
                    })
                    .ok_or(ActionError::InvalidContext { field: "venture" })?;
                if let Some(instance) = self.game.store.get_mut(source) {
                    instance.add_counters(CounterKind::Charge, 1);
                }
                Ok(0.0)
            }
            MechanicAction::Exert => {
                let last = self
                    .game
                    .combat
                    .attackers
                    .last()
                    .copied()
                    .ok_or(ActionError::InvalidContext { field: "attacker" })?;
                self.game.players[actor].skip_untap.insert(last);
                Ok(0.0)
            }
            MechanicAction::Explore => {
                let explorer = self.game.players[actor]
                    .battlefield
                    .iter()
                    .copied()
                    .find(|&c| {
                        self.game
                            .card_data(c)
                            .is_some_and(|d| d.has_keyword(Keyword::Explore))
                    })
                    .ok_or(ActionError::InvalidContext { field: "explore" })?;
                let top = self.game.players[actor].library.first().copied();
                match top {
                    Some(card) if self.game.card_data(card).is_some_and(|d| d.is_land()) => {
                        let _ = self.game.move_card(
                            self.handler,
                            card,
                            Zone::Hand,
                            ZonePlacement::Top,
                            None,
                        );
                    }
                    Some(_) => {
                        if let Some(instance) = self.game.store.get_mut(explorer) {
                            instance.add_counters(CounterKind::PlusOnePlusOne, 1);
                        }
                    }
                    None => {}
                }
                Ok(0.01)
            }
            MechanicAction::Adapt => {
                let idx = match ctx {
                    ActionContext::Battlefield { battlefield_idx } => *battlefield_idx,
                    _ => return Err(ActionError::InvalidContext { field: "battlefield_idx" }),
                };
                let card = self
                    .game
                    .battlefield_card(actor, idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                if self
                    .game
                    .instance(card)
                    .is_some_and(|i| i.counter(CounterKind::PlusOnePlusOne) > 0)
                {
                    return Err(ActionError::InvalidContext { field: "adapt" });
                }
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Adapt))
                    .ok_or(ActionError::InvalidContext { field: "adapt" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                if let Some(instance) = self.game.store.get_mut(card) {
                    instance.add_counters(CounterKind::PlusOnePlusOne, 2);
                }
                Ok(0.01)
            }
            MechanicAction::Mutate => {
                let (hand_idx, target_idx) = match ctx {
                    ActionContext::Attach {
                        source_idx,
                        target_idx,
                    } => (*source_idx, *target_idx),
                    _ => return Err(ActionError::InvalidContext { field: "source_idx" }),
                };
                let card = self
                    .game
                    .hand_card(actor, hand_idx)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                let host = self
                    .game
                    .battlefield_card(actor, target_idx)
                    .filter(|&h| self.game.is_creature(h))
                    .ok_or(ActionError::InvalidContext { field: "target_idx" })?;
                let card_id = self
                    .game
                    .instance(card)
                    .map(|i| i.card_id)
                    .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Mutate))
                    .ok_or(ActionError::InvalidContext { field: "mutate" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                // The mutating card merges beneath the host; the host
                // presents the best stats and the union of keywords.
                self.game
                    .move_card(self.handler, card, Zone::Exile, ZonePlacement::Top, None)
                    .map_err(|_| ActionError::ResolutionFailed)?;
                self.game.players[actor]
                    .merged
                    .entry(host)
                    .or_default()
                    .push(card_id);
                Ok(0.02)
            }
            MechanicAction::Cycling => {
                let card = self.hand_card_ctx(actor, ctx)?;
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Cycling))
                    .ok_or(ActionError::InvalidContext { field: "cycling" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                self.game
                    .discard(self.handler, actor, card)
                    .map_err(|_| ActionError::ResolutionFailed)?;
                self.game.draw_card(self.handler, actor);
                Ok(0.01)
            }
            MechanicAction::Goad => {
                let idx = match ctx {
                    ActionContext::Battlefield { battlefield_idx } => *battlefield_idx,
                    _ => 0,
                };
                let target = self
                    .game
                    .battlefield_card(actor.opponent(), idx)
                    .filter(|&c| self.game.is_creature(c))
                    .ok_or(ActionError::InvalidContext { field: "target" })?;
                let until = self.game.turn + 2;
                self.game.players[actor.opponent()].goaded.insert(target, until);
                Ok(0.01)
            }
            MechanicAction::Boast => {
                let idx = match ctx {
                    ActionContext::Battlefield { battlefield_idx } => *battlefield_idx,
                    _ => return Err(ActionError::InvalidContext { field: "battlefield_idx" }),
                };
                let card = self
                    .game
                    .battlefield_card(actor, idx)
                    .ok_or(ActionError::InvalidContext { field: "battlefield_idx" })?;
                if !self.game.players[actor].attacked_this_turn.contains(&card) {
                    return Err(ActionError::InvalidContext { field: "boast" });
                }
                let cost = self
                    .game
                    .card_data(card)
                    .and_then(|d| d.keyword_cost(Keyword::Boast))
                    .ok_or(ActionError::InvalidContext { field: "boast" })?;
                self.mana
                    .pay(self.game, actor, &cost, 0)
                    .map_err(|_| ActionError::CostPaymentFailed)?;
                self.game.stack.push(
                    StackItemKind::Ability {
                        source: card,
                        ability_idx: 0,
                    },
                    actor,
                    SpellContext::default(),
                );
                if self.game.phase.is_turn_phase() {
                    self.game.enter_subphase(Phase::Priority);
                }
                self.game.assign_priority(actor);
                Ok(0.01)
            }
        }
    }

    // === Small lookups ===

    fn hand_card_ctx(
        &self,
        actor: PlayerId,
        ctx: &ActionContext,
    ) -> Result<CardHandle, ActionError> {
        let idx = ctx
            .hand_idx()
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })?;
        self.game
            .hand_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "hand_idx" })
    }

    fn gy_card(&self, actor: PlayerId, ctx: &ActionContext) -> Result<CardHandle, ActionError> {
        let idx = ctx
            .graveyard_idx()
            .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })?;
        self.game
            .graveyard_card(actor, idx)
            .ok_or(ActionError::InvalidContext { field: "graveyard_idx" })
    }

    fn counter_target(&self, actor: PlayerId, idx: usize) -> Option<CardHandle> {
        self.game.players[actor]
            .battlefield
            .iter()
            .chain(self.game.players[actor.opponent()].battlefield.iter())
            .copied()
            .nth(idx)
    }

    fn top_cmc(&self, player: PlayerId) -> u32 {
        self.game.players[player]
            .library
            .first()
            .and_then(|&c| self.game.card_data(c))
            .map_or(0, |d| d.cmc())
    }
}
