//! Reward shaping scalars.
//!
//! The dispatcher adds a shaped state-change delta to each handler's
//! reward: fixed coefficients over life totals, hand sizes, board
//! counts, and total creature power. Coefficients are configuration,
//! not policy, and stay constant within a run.

use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, PlayerPair};

use super::game::Game;

/// Fixed shaping coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub life: f32,
    pub hand: f32,
    pub board: f32,
    pub power: f32,
    /// Penalty for an action the mask forbids.
    pub mask_miss_penalty: f32,
    /// Terminal rewards.
    pub win: f32,
    pub loss: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            life: 0.02,
            hand: 0.01,
            board: 0.02,
            power: 0.01,
            mask_miss_penalty: -0.1,
            win: 1.0,
            loss: -1.0,
        }
    }
}

/// The observable scalars the shaping delta is computed over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub life: PlayerPair<i32>,
    pub hand: PlayerPair<i32>,
    pub board: PlayerPair<i32>,
    pub power: PlayerPair<i32>,
}

impl StateSnapshot {
    #[must_use]
    pub fn capture(game: &Game) -> Self {
        Self {
            life: PlayerPair::new(|p| game.players[p].life),
            hand: PlayerPair::new(|p| game.players[p].hand.len() as i32),
            board: PlayerPair::new(|p| game.players[p].battlefield.len() as i32),
            power: PlayerPair::new(|p| {
                game.players[p]
                    .battlefield
                    .iter()
                    .filter(|&&c| game.is_creature(c))
                    .map(|&c| game.power_of(c))
                    .sum()
            }),
        }
    }

    /// Shaped delta from `self` to `after`, from one seat's view:
    /// improvements for the perspective player count positively,
    /// improvements for the opponent negatively.
    #[must_use]
    pub fn shaped_delta(
        &self,
        after: &StateSnapshot,
        weights: &RewardWeights,
        perspective: PlayerId,
    ) -> f32 {
        let diff = |pair_before: &PlayerPair<i32>, pair_after: &PlayerPair<i32>| {
            let mine = (pair_after[perspective] - pair_before[perspective]) as f32;
            let theirs =
                (pair_after[perspective.opponent()] - pair_before[perspective.opponent()]) as f32;
            mine - theirs
        };

        weights.life * diff(&self.life, &after.life)
            + weights.hand * diff(&self.hand, &after.hand)
            + weights.board * diff(&self.board, &after.board)
            + weights.power * diff(&self.power, &after.power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(life: [i32; 2], board: [i32; 2]) -> StateSnapshot {
        StateSnapshot {
            life: PlayerPair::new(|p| life[p.index()]),
            hand: PlayerPair::with_value(0),
            board: PlayerPair::new(|p| board[p.index()]),
            power: PlayerPair::with_value(0),
        }
    }

    #[test]
    fn test_opponent_life_loss_is_positive() {
        let before = snapshot([20, 20], [0, 0]);
        let after = snapshot([20, 17], [0, 0]);
        let weights = RewardWeights::default();

        let delta = before.shaped_delta(&after, &weights, PlayerId::P1);
        assert!(delta > 0.0);

        let from_p2 = before.shaped_delta(&after, &weights, PlayerId::P2);
        assert!(from_p2 < 0.0);
    }

    #[test]
    fn test_symmetric_change_is_neutral() {
        let before = snapshot([20, 20], [1, 1]);
        let after = snapshot([18, 18], [2, 2]);
        let weights = RewardWeights::default();

        let delta = before.shaped_delta(&after, &weights, PlayerId::P1);
        assert!(delta.abs() < f32::EPSILON);
    }
}
