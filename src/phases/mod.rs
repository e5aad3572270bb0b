//! The phase machine: turn structure, priority passing, and stuck-state
//! recovery.
//!
//! Transitions are legal only when the stack is empty and both players
//! have passed, or from the non-interactive phases (untap, cleanup run
//! automatically). Mana pools empty at every boundary. Combat damage is
//! dealt when its step is left, so the priority window inside the step
//! comes first.

use tracing::{debug, warn};

use crate::cards::{CounterKind, Keyword};
use crate::core::{CardHandle, Phase, PlayerId, Zone};
use crate::game::{Game, GameEvent, ZonePlacement};
use crate::rules::AbilityHandler;

/// Stuck-state recovery thresholds (consecutive no-op decisions).
pub const RECOVERY_L1: u32 = 3;
pub const RECOVERY_L2: u32 = 6;
pub const RECOVERY_L3: u32 = 12;

impl Game {
    /// Start the first turn once both players have kept.
    pub fn begin_first_turn(&mut self, handler: &dyn AbilityHandler) {
        debug_assert!(self.mulligans_complete());
        self.active = PlayerId::P1;
        self.turn = 1;
        self.begin_turn(handler);
    }

    /// Run the start-of-turn sequence: untap (no priority), then
    /// upkeep with priority to the active player.
    pub fn begin_turn(&mut self, handler: &dyn AbilityHandler) {
        let active = self.active;
        self.players[active].begin_turn();
        self.life_lost_this_turn = crate::core::PlayerPair::with_value(0);
        self.last_drawn = crate::core::PlayerPair::with_value(None);

        self.phase = Phase::Untap;
        self.priority = None;
        self.fire_event(
            handler,
            GameEvent::TurnBegins {
                player: active,
                turn: self.turn,
            },
        );

        // Untap everything the active player controls, except exerted
        // permanents, which skip one untap.
        let battlefield = self.players[active].battlefield.clone();
        for card in battlefield {
            if self.players[active].skip_untap.contains(&card) {
                self.players[active].skip_untap.remove(&card);
            } else {
                self.players[active].untap(card);
            }
        }

        self.enter_phase(handler, Phase::Upkeep);
    }

    /// Enter a turn phase: empty pools, fire the begin event, run the
    /// phase's automatic entry behaviour, and open priority.
    pub fn enter_phase(&mut self, handler: &dyn AbilityHandler, phase: Phase) {
        self.phase = phase;
        self.resume_phase = None;
        self.empty_mana_pools();
        let active = self.active;
        self.fire_event(handler, GameEvent::PhaseBegins { phase, active });
        debug!(%phase, turn = self.turn, "phase begins");

        match phase {
            Phase::Upkeep => {
                self.tick_suspended(handler, active);
                self.assign_priority(active);
            }
            Phase::Draw => {
                let skip = self.turn == 1 && self.skip_first_draw;
                if !skip {
                    if !self.dredge_candidates(active).is_empty()
                        && !self.players[active].library.is_empty()
                    {
                        // Offer the draw replacement; the draw happens
                        // when the step is left without dredging.
                        self.dredge_pending = true;
                    } else {
                        self.draw_card(handler, active);
                    }
                }
                self.assign_priority(active);
            }
            Phase::EndOfCombat => {
                self.on_end_of_combat(handler);
                self.assign_priority(active);
            }
            Phase::Cleanup => {
                self.cleanup_step(handler);
            }
            _ => {
                self.assign_priority(active);
            }
        }
    }

    /// Advance the turn structure one step.
    ///
    /// Damage steps deal their damage on the way out; cleanup rolls the
    /// turn over.
    pub fn advance(&mut self, handler: &dyn AbilityHandler) {
        if !self.stack.is_empty() {
            return;
        }
        if !self.phase.is_turn_phase() {
            self.leave_subphase();
            return;
        }

        match self.phase {
            Phase::Draw if self.dredge_pending => {
                self.dredge_pending = false;
                let active = self.active;
                self.draw_card(handler, active);
                self.enter_phase(handler, Phase::MainPre);
            }
            Phase::FirstStrikeDamage => {
                self.deal_combat_damage(handler, true);
                self.between_damage_steps(handler);
                self.enter_phase(handler, Phase::CombatDamage);
            }
            Phase::CombatDamage => {
                self.deal_combat_damage(handler, false);
                self.enter_phase(handler, Phase::EndOfCombat);
            }
            Phase::Cleanup => {
                self.end_turn(handler);
            }
            phase => {
                let first_strike = self.combat_has_first_strike(handler);
                let combatants = !self.combat.attackers.is_empty();
                if let Some(next) = phase.next_in_turn(first_strike, combatants) {
                    // Attacker/blocker commits drive their own exits.
                    if phase == Phase::DeclareAttackers {
                        self.declare_attackers_done(handler);
                    } else if phase == Phase::DeclareBlockers {
                        if !self.declare_blockers_done(handler) {
                            return;
                        }
                    } else {
                        self.enter_phase(handler, next);
                    }
                }
            }
        }
    }

    /// Pass priority.
    ///
    /// Both players passing advances the phase on an empty stack or
    /// resolves the stack top otherwise; a single pass flips priority.
    pub fn pass_priority(&mut self, handler: &dyn AbilityHandler, player: PlayerId) {
        if self.priority != Some(player) {
            // Stuck-state guard: an interactive phase with no priority
            // holder reassigns to the active player.
            if self.priority.is_none() && self.phase.is_interactive() {
                self.assign_priority(self.active);
            }
            return;
        }

        self.passes += 1;
        if self.passes >= 2 {
            if self.stack.is_empty() {
                self.advance(handler);
            } else {
                self.resolve_top_of_stack(handler);
            }
        } else {
            self.priority = Some(player.opponent());
        }
    }

    /// End-of-turn and cleanup behaviour. May leave priority open when
    /// the active player must discard.
    fn cleanup_step(&mut self, handler: &dyn AbilityHandler) {
        let active = self.active;

        let excess = self.players[active]
            .hand
            .len()
            .saturating_sub(self.max_hand_size);
        if excess > 0 {
            // Discard happens through DISCARD_CARD actions; stay in
            // cleanup with priority open until the hand is legal.
            self.assign_priority(active);
            return;
        }

        // "Until end of turn" bookkeeping.
        self.wipe_damage();
        let returns = std::mem::take(&mut self.return_at_eot);
        for card in returns {
            if self.store.is_live(card) {
                let _ = self.move_card(handler, card, Zone::Hand, ZonePlacement::Top, None);
            }
        }
        let exiles = std::mem::take(&mut self.exile_at_eot);
        for card in exiles {
            if self.store.is_live(card) {
                let _ = self.move_card(handler, card, Zone::Exile, ZonePlacement::Top, None);
            }
        }
        self.prevention = crate::core::PlayerPair::with_value(0);
        self.redirect = crate::core::PlayerPair::with_value(None);
        self.madness_window = None;

        let turn = self.turn;
        for player in PlayerId::both() {
            self.players[player].goaded.retain(|_, &mut until| until > turn);
        }

        // Priority opens in cleanup only if something demands it.
        if !self.pending_triggers.is_empty() {
            self.assign_priority(active);
            return;
        }
        self.end_turn(handler);
    }

    /// Roll the turn over, truncating at the turn limit.
    fn end_turn(&mut self, handler: &dyn AbilityHandler) {
        if self.turn >= self.max_turns {
            warn!(turn = self.turn, "turn limit reached");
            self.truncated = true;
            return;
        }
        self.turn += 1;
        self.active = self.active.opponent();
        self.begin_turn(handler);
    }

    /// Cleanup discard done check: re-run cleanup once the hand is
    /// legal again.
    pub fn continue_cleanup(&mut self, handler: &dyn AbilityHandler) {
        if self.phase == Phase::Cleanup
            && self.players[self.active].hand.len() <= self.max_hand_size
        {
            self.cleanup_step(handler);
        }
    }

    /// Remove one time counter from each suspended card the player
    /// owns in exile.
    fn tick_suspended(&mut self, _handler: &dyn AbilityHandler, player: PlayerId) {
        let exile = self.players[player].exile.clone();
        for card in exile {
            let is_suspended = self
                .instance(card)
                .is_some_and(|i| i.suspended && i.counter(CounterKind::Time) > 0);
            if is_suspended {
                if let Some(instance) = self.store.get_mut(card) {
                    instance.add_counters(CounterKind::Time, -1);
                }
            }
        }
    }

    // === Dredge ===

    /// Graveyard cards of a player that carry dredge.
    #[must_use]
    pub fn dredge_candidates(&self, player: PlayerId) -> Vec<CardHandle> {
        self.players[player]
            .graveyard
            .iter()
            .copied()
            .filter(|&c| {
                self.card_data(c)
                    .is_some_and(|d| d.has_keyword(Keyword::Dredge))
            })
            .collect()
    }

    /// Replace the pending draw: mill N, return the dredger to hand.
    pub fn do_dredge(
        &mut self,
        handler: &dyn AbilityHandler,
        player: PlayerId,
        card: CardHandle,
    ) -> bool {
        if !self.dredge_pending {
            return false;
        }
        let Some(n) = self
            .card_data(card)
            .and_then(|d| d.keyword_cost(Keyword::Dredge))
            .map(|c| c.generic as usize)
        else {
            return false;
        };
        if self.players[player].library.len() < n {
            return false;
        }

        self.mill(handler, player, n);
        if self
            .move_card(handler, card, Zone::Hand, ZonePlacement::Top, None)
            .is_err()
        {
            return false;
        }
        self.dredge_pending = false;
        true
    }

    // === Stuck-state recovery ===

    /// Escalating recovery when the agent spins on no-ops. Returns
    /// true if a recovery level fired.
    pub fn recover_if_stuck(&mut self, handler: &dyn AbilityHandler) -> bool {
        if self.noop_streak <= RECOVERY_L1 {
            return false;
        }

        if self.noop_streak > RECOVERY_L3 {
            warn!(streak = self.noop_streak, "stuck recovery L3: forcing phase");
            // Abandon whatever is wedged and force the turn forward.
            self.abort_choice_contexts();
            self.pending_spell = None;
            if !self.phase.is_turn_phase() {
                self.leave_subphase();
            }
            self.passes = 0;
            self.assign_priority(self.active);
            self.advance(handler);
            if self.noop_streak > RECOVERY_L3 * 2 {
                // Recovery itself failed; flag and end in a draw.
                self.error_flagged = true;
                self.flag_draw();
            }
            return true;
        }
        if self.noop_streak > RECOVERY_L2 {
            warn!(streak = self.noop_streak, "stuck recovery L2: forced pass");
            self.passes = 2;
            if self.stack.is_empty() {
                self.advance(handler);
            } else {
                self.resolve_top_of_stack(handler);
            }
            return true;
        }
        // L1: reassign priority.
        if self.priority.is_none() && self.phase.is_interactive() {
            warn!(streak = self.noop_streak, "stuck recovery L1: priority");
            self.assign_priority(self.active);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardData, CardId, CardRegistry, CardType, TypeLine};
    use crate::core::{PlayerPair, ManaCost};
    use crate::game::GameConfig;
    use crate::rules::BasicAbilityHandler;

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(
            CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::generic(2))
                .with_stats(2, 2),
        );
        r
    }

    fn started_game() -> (Game, BasicAbilityHandler) {
        let deck: Vec<CardId> = (0..30).map(|_| CardId::new(1)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            23,
        );
        let handler = BasicAbilityHandler::new();
        game.keep_hand(PlayerId::P1);
        game.keep_hand(PlayerId::P2);
        game.begin_first_turn(&handler);
        (game, handler)
    }

    #[test]
    fn test_first_turn_starts_in_upkeep() {
        let (game, _) = started_game();
        assert_eq!(game.phase, Phase::Upkeep);
        assert_eq!(game.priority, Some(PlayerId::P1));
        assert_eq!(game.turn, 1);
    }

    #[test]
    fn test_first_draw_skipped() {
        let (mut game, handler) = started_game();
        let hand_before = game.players[PlayerId::P1].hand.len();

        // Upkeep -> Draw via double pass.
        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);

        assert_eq!(game.phase, Phase::Draw);
        assert_eq!(game.players[PlayerId::P1].hand.len(), hand_before);
    }

    #[test]
    fn test_second_turn_draws() {
        let (mut game, handler) = started_game();
        // Walk turn 1 to completion.
        let mut guard = 0;
        while game.turn == 1 && guard < 60 {
            let holder = game.priority.unwrap_or(game.active);
            game.pass_priority(&handler, holder);
            guard += 1;
        }
        assert_eq!(game.turn, 2);
        assert_eq!(game.active, PlayerId::P2);

        let hand_before = game.players[PlayerId::P2].hand.len();
        // Upkeep -> Draw.
        game.pass_priority(&handler, game.priority.unwrap());
        game.pass_priority(&handler, game.priority.unwrap());
        assert_eq!(game.phase, Phase::Draw);
        assert_eq!(game.players[PlayerId::P2].hand.len(), hand_before + 1);
    }

    #[test]
    fn test_single_pass_flips_priority() {
        let (mut game, handler) = started_game();
        assert_eq!(game.priority, Some(PlayerId::P1));

        game.pass_priority(&handler, PlayerId::P1);
        assert_eq!(game.priority, Some(PlayerId::P2));
        assert_eq!(game.phase, Phase::Upkeep);
    }

    #[test]
    fn test_mana_pool_empties_on_boundary() {
        let (mut game, handler) = started_game();
        game.players[PlayerId::P1].pool.add(crate::core::Color::Green);

        game.pass_priority(&handler, PlayerId::P1);
        game.pass_priority(&handler, PlayerId::P2);

        assert!(game.players[PlayerId::P1].pool.is_empty());
    }

    #[test]
    fn test_truncation_at_turn_limit() {
        let deck: Vec<CardId> = (0..30).map(|_| CardId::new(1)).collect();
        let mut game = Game::new(
            registry(),
            GameConfig {
                max_turns: 1,
                ..GameConfig::default()
            },
            PlayerPair::with_value(deck),
            29,
        );
        let handler = BasicAbilityHandler::new();
        game.keep_hand(PlayerId::P1);
        game.keep_hand(PlayerId::P2);
        game.begin_first_turn(&handler);

        let mut guard = 0;
        while !game.truncated && guard < 60 {
            let holder = game.priority.unwrap_or(game.active);
            game.pass_priority(&handler, holder);
            guard += 1;
        }
        assert!(game.truncated);
        assert_eq!(game.turn, 1);
    }

    #[test]
    fn test_priority_reassignment_when_undefined() {
        let (mut game, handler) = started_game();
        game.priority = None;

        game.pass_priority(&handler, PlayerId::P1);
        assert_eq!(game.priority, Some(PlayerId::P1));
    }

    #[test]
    fn test_recovery_l3_clears_contexts() {
        let (mut game, handler) = started_game();
        game.begin_scry(PlayerId::P1, 1);
        game.noop_streak = RECOVERY_L3 + 1;

        assert!(game.recover_if_stuck(&handler));
        assert!(game.choice.is_none());
        assert!(game.phase.is_turn_phase());
    }
}
