//! The RL environment facade.
//!
//! Owns the game value and the collaborator trait objects, and exposes
//! the two-call surface an agent drives: `action_mask()` and
//! `step(index, context)`. Decks, seeds, and collaborators are wired
//! through the builder.

use crate::actions::{
    decision_player, ActionContext, ActionDispatcher, ActionMask, ActionMaskGenerator, StepResult,
};
use crate::cards::{CardId, CardRegistry};
use crate::core::{PlayerId, PlayerPair};
use crate::game::{Game, GameConfig, GameOutcome, RewardWeights};
use crate::rules::{
    AbilityHandler, BasicAbilityHandler, CardEvaluator, GreedyEvaluator, ManaSystem,
    PoolManaSystem,
};

/// A playable environment: game state plus collaborators.
pub struct MtgEnv {
    pub game: Game,
    handler: Box<dyn AbilityHandler>,
    mana: Box<dyn ManaSystem>,
    evaluator: Box<dyn CardEvaluator>,
    weights: RewardWeights,
    /// The seat rewards are shaped for.
    agent: PlayerId,
    config: GameConfig,
    registry: CardRegistry,
    decks: PlayerPair<Vec<CardId>>,
}

impl MtgEnv {
    /// Start building an environment.
    #[must_use]
    pub fn builder(registry: CardRegistry) -> MtgEnvBuilder {
        MtgEnvBuilder::new(registry)
    }

    /// The player whose decision the next mask describes.
    #[must_use]
    pub fn decision_player(&self) -> PlayerId {
        decision_player(&self.game)
    }

    /// The mask for the current decision player.
    #[must_use]
    pub fn action_mask(&self) -> ActionMask {
        ActionMaskGenerator::generate(
            &self.game,
            self.handler.as_ref(),
            self.mana.as_ref(),
            self.decision_player(),
        )
    }

    /// The mask from an arbitrary perspective.
    #[must_use]
    pub fn action_mask_for(&self, perspective: PlayerId) -> ActionMask {
        ActionMaskGenerator::generate(
            &self.game,
            self.handler.as_ref(),
            self.mana.as_ref(),
            perspective,
        )
    }

    /// Apply one action for the current decision player.
    pub fn step(&mut self, index: u16, context: &ActionContext) -> StepResult {
        let mut dispatcher = ActionDispatcher {
            game: &mut self.game,
            handler: self.handler.as_ref(),
            mana: self.mana.as_ref(),
            evaluator: self.evaluator.as_ref(),
            weights: &self.weights,
            agent: self.agent,
        };
        dispatcher.apply(index, context)
    }

    /// Restart from the configured decks with a new seed.
    pub fn reset(&mut self, seed: u64) -> ActionMask {
        self.game = Game::new(
            self.registry.clone(),
            self.config.clone(),
            self.decks.clone(),
            seed,
        );
        self.action_mask()
    }

    /// Final result from the agent's perspective.
    #[must_use]
    pub fn outcome(&self) -> GameOutcome {
        self.game.outcome_for(self.agent)
    }
}

/// Builder for [`MtgEnv`].
pub struct MtgEnvBuilder {
    registry: CardRegistry,
    config: GameConfig,
    decks: PlayerPair<Vec<CardId>>,
    weights: RewardWeights,
    agent: PlayerId,
    handler: Option<Box<dyn AbilityHandler>>,
    mana: Option<Box<dyn ManaSystem>>,
    evaluator: Option<Box<dyn CardEvaluator>>,
}

impl MtgEnvBuilder {
    #[must_use]
    pub fn new(registry: CardRegistry) -> Self {
        Self {
            registry,
            config: GameConfig::default(),
            decks: PlayerPair::with_value(Vec::new()),
            weights: RewardWeights::default(),
            agent: PlayerId::P1,
            handler: None,
            mana: None,
            evaluator: None,
        }
    }

    #[must_use]
    pub fn deck(mut self, player: PlayerId, deck: Vec<CardId>) -> Self {
        self.decks[player] = deck;
        self
    }

    #[must_use]
    pub fn config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.config.max_turns = max_turns;
        self
    }

    #[must_use]
    pub fn reward_weights(mut self, weights: RewardWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: PlayerId) -> Self {
        self.agent = agent;
        self
    }

    #[must_use]
    pub fn ability_handler(mut self, handler: Box<dyn AbilityHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn mana_system(mut self, mana: Box<dyn ManaSystem>) -> Self {
        self.mana = Some(mana);
        self
    }

    #[must_use]
    pub fn evaluator(mut self, evaluator: Box<dyn CardEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Build the environment and deal the opening hands.
    #[must_use]
    pub fn build(self, seed: u64) -> MtgEnv {
        let game = Game::new(
            self.registry.clone(),
            self.config.clone(),
            self.decks.clone(),
            seed,
        );
        MtgEnv {
            game,
            handler: self
                .handler
                .unwrap_or_else(|| Box::new(BasicAbilityHandler::new())),
            mana: self.mana.unwrap_or_else(|| Box::new(PoolManaSystem::new())),
            evaluator: self
                .evaluator
                .unwrap_or_else(|| Box::new(GreedyEvaluator::new())),
            weights: self.weights,
            agent: self.agent,
            config: self.config,
            registry: self.registry,
            decks: self.decks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionContext;
    use crate::cards::{CardData, CardType, TypeLine};
    use crate::core::ManaCost;

    fn registry() -> CardRegistry {
        let mut r = CardRegistry::new();
        r.register(
            CardData::new(CardId::new(1), "Bear", TypeLine::of(CardType::Creature))
                .with_cost(ManaCost::generic(2))
                .with_stats(2, 2),
        );
        r
    }

    fn env() -> MtgEnv {
        let deck: Vec<CardId> = (0..30).map(|_| CardId::new(1)).collect();
        MtgEnv::builder(registry())
            .deck(PlayerId::P1, deck.clone())
            .deck(PlayerId::P2, deck)
            .build(43)
    }

    #[test]
    fn test_env_starts_in_mulligan() {
        let env = env();
        let mask = env.action_mask();
        assert!(mask.allowed(225), "keep hand available");
        assert!(mask.allowed(6), "mulligan available");
    }

    #[test]
    fn test_keep_both_starts_game() {
        let mut env = env();
        env.step(225, &ActionContext::None);
        let result = env.step(225, &ActionContext::None);

        assert!(!result.done);
        assert_eq!(env.game.turn, 1);
        assert!(env.game.mulligans_complete());
    }

    #[test]
    fn test_mask_miss_penalised_without_state_change() {
        let mut env = env();
        let life_before = env.game.players[PlayerId::P1].life;

        // PASS_PRIORITY is illegal during the mulligan decision.
        let result = env.step(11, &ActionContext::None);

        assert!(result.reward < 0.0);
        assert!(result.info.error_message.is_some());
        assert_eq!(env.game.players[PlayerId::P1].life, life_before);
        assert!(!env.game.mulligans_complete());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut env = env();
        let result = env.step(9999, &ActionContext::None);
        assert!(result.reward < 0.0);
        assert!(!result.done);
    }

    #[test]
    fn test_reset_reproduces_opening() {
        let mut env = env();
        env.step(225, &ActionContext::None);
        env.step(225, &ActionContext::None);

        env.reset(43);
        assert!(!env.game.mulligans_complete());
        assert_eq!(env.game.players[PlayerId::P1].hand.len(), 7);
    }

    #[test]
    fn test_concede_ends_game() {
        let mut env = env();
        env.step(225, &ActionContext::None);
        env.step(225, &ActionContext::None);

        // Walk until P1 can concede... conceding is always routed via
        // the dispatcher; force it directly instead.
        env.game.flag_loss(PlayerId::P1);
        let result = env.step(4, &ActionContext::None);

        assert!(result.done);
        assert_eq!(result.info.game_result, Some(GameOutcome::Loss));
        assert_eq!(env.outcome(), GameOutcome::Loss);
    }
}
