//! Property-based tests for the universal invariants.
//!
//! Random walks are driven by choosing uniformly among the currently
//! legal action indices, so every reachable state the walk visits is a
//! state an agent could reach.

use proptest::prelude::*;

use mtg_sim::cards::{AbilityData, ManaProduce};
use mtg_sim::{
    ActionContext, CardData, CardId, CardRegistry, CardType, Color, ManaCost, MtgEnv, PlayerId,
    TypeLine,
};

const FOREST: CardId = CardId::new(1);
const BEAR: CardId = CardId::new(2);

fn registry() -> CardRegistry {
    let mut r = CardRegistry::new();
    r.register(
        CardData::new(FOREST, "Forest", TypeLine::of(CardType::Land).with_subtype("Forest"))
            .with_ability(AbilityData::mana(ManaProduce::Color(Color::Green))),
    );
    r.register(
        CardData::new(BEAR, "Grizzly Bears", TypeLine::of(CardType::Creature))
            .with_cost(ManaCost::generic(1).with_pips(Color::Green, 1))
            .with_stats(2, 2),
    );
    r
}

fn env(seed: u64) -> MtgEnv {
    let deck: Vec<CardId> = (0..40)
        .map(|i| if i % 5 < 3 { FOREST } else { BEAR })
        .collect();
    MtgEnv::builder(registry())
        .deck(PlayerId::P1, deck.clone())
        .deck(PlayerId::P2, deck)
        .max_turns(20)
        .build(seed)
}

/// Pick the n-th legal action (wrapping), preferring real actions over
/// a lone fallback where possible.
fn nth_legal(mask: &mtg_sim::ActionMask, n: usize) -> u16 {
    let legal: Vec<u16> = mask.set_indices().collect();
    assert!(!legal.is_empty(), "mask must never be empty");
    legal[n % legal.len()]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Invariant 1: every reachable state has at least one legal action,
    /// and invariant 6: once the game ends it stays ended.
    #[test]
    fn random_walk_keeps_mask_nonempty(seed in 0u64..2000, picks in prop::collection::vec(0usize..64, 120)) {
        let mut env = env(seed);
        let mut was_done = false;

        for &pick in &picks {
            let mask = env.action_mask();
            prop_assert!(mask.count() > 0);

            let action = nth_legal(&mask, pick);
            let result = env.step(action, &ActionContext::None);

            if was_done {
                prop_assert!(result.done, "game end flags are monotone");
            }
            was_done = was_done || result.done;
        }
    }

    /// Invariant 2: an action whose mask bit is false leaves the
    /// observable state unchanged (idle-streak bookkeeping aside).
    #[test]
    fn masked_out_action_is_inert(seed in 0u64..2000, picks in prop::collection::vec(0usize..64, 30)) {
        let mut env = env(seed);
        for &pick in &picks {
            let mask = env.action_mask();
            // Find an illegal index.
            let illegal = (0..mtg_sim::ACTION_SPACE as u16)
                .find(|&i| !mask.allowed(i));
            let Some(illegal) = illegal else { continue };

            let mut before = env.game.clone();
            before.noop_streak = 0;
            let result = env.step(illegal, &ActionContext::None);
            let mut after = env.game.clone();
            after.noop_streak = 0;

            prop_assert!(result.reward < 0.0);
            let before_bytes = bincode::serialize(&before).unwrap();
            let after_bytes = bincode::serialize(&after).unwrap();
            prop_assert_eq!(before_bytes, after_bytes);

            // Take one legal step so walks make progress.
            let action = nth_legal(&env.action_mask(), pick);
            env.step(action, &ActionContext::None);
        }
    }

    /// Invariant 8: replaying the same seed and action sequence
    /// reproduces masks and rewards bit-for-bit.
    #[test]
    fn replay_is_deterministic(seed in 0u64..2000, picks in prop::collection::vec(0usize..64, 80)) {
        let mut first = env(seed);
        let mut actions = Vec::new();
        let mut rewards = Vec::new();

        for &pick in &picks {
            let mask = first.action_mask();
            let action = nth_legal(&mask, pick);
            actions.push(action);
            let result = first.step(action, &ActionContext::None);
            rewards.push(result.reward.to_bits());
        }
        let final_mask = first.action_mask().to_vec();

        let mut second = env(seed);
        let mut replayed = Vec::new();
        for &action in &actions {
            let result = second.step(action, &ActionContext::None);
            replayed.push(result.reward.to_bits());
        }

        prop_assert_eq!(rewards, replayed);
        prop_assert_eq!(final_mask, second.action_mask().to_vec());
        prop_assert_eq!(
            first.game.players[PlayerId::P1].life,
            second.game.players[PlayerId::P1].life
        );
    }

    /// Invariant 4: mana pools are empty whenever a phase boundary has
    /// just been crossed (observed as: whenever neither player holds
    /// floating mana obligations at a fresh decision point with an
    /// empty stack and no pending cast).
    #[test]
    fn pools_empty_after_phase_boundaries(seed in 0u64..2000) {
        let mut env = env(seed);
        env.step(225, &ActionContext::None);
        env.step(225, &ActionContext::None);

        let mut last_phase = env.game.phase;
        for _ in 0..200 {
            let mask = env.action_mask();
            // Always pass/advance: no mana is ever floated, and any
            // boundary crossing must find the pools empty.
            let action = if mask.allowed(11) { 11 } else { nth_legal(&mask, 0) };
            let result = env.step(action, &ActionContext::None);
            if env.game.phase != last_phase {
                prop_assert!(env.game.players[PlayerId::P1].pool.is_empty());
                prop_assert!(env.game.players[PlayerId::P2].pool.is_empty());
                last_phase = env.game.phase;
            }
            if result.done {
                break;
            }
        }
    }
}

/// Invariant 3: from a quiescent state with an empty stack, two passes
/// advance the phase.
#[test]
fn double_pass_advances_phase() {
    let mut env = env(7);
    env.step(225, &ActionContext::None);
    env.step(225, &ActionContext::None);

    let mut advances = 0;
    let mut phase = env.game.phase;
    for _ in 0..40 {
        env.step(11, &ActionContext::None);
        env.step(11, &ActionContext::None);
        assert_ne!(env.game.phase, phase, "two passes must advance");
        phase = env.game.phase;
        advances += 1;
        if advances > 8 {
            break;
        }
    }
}

/// Invariant 7: LIFO. The later push resolves first.
#[test]
fn stack_resolves_lifo() {
    use mtg_sim::rules::BasicAbilityHandler;
    use mtg_sim::{SimpleEffect, StackItemKind, SpellContext, Zone, ZonePlacement};

    let mut env = env(9);
    env.step(225, &ActionContext::None);
    env.step(225, &ActionContext::None);

    let mut handler = BasicAbilityHandler::new();
    handler.register_effect(BEAR, SimpleEffect::GainLife { amount: 1 });

    // Push two bear "spells" by hand; resolve both.
    let first = env.game.players[PlayerId::P1].hand[0];
    let first = env
        .game
        .move_card(&handler, first, Zone::Stack, ZonePlacement::Top, None)
        .unwrap();
    let first_id = env.game.stack.push(
        StackItemKind::Spell {
            card: first,
            card_id: BEAR,
        },
        PlayerId::P1,
        SpellContext::default(),
    );
    let second = env.game.players[PlayerId::P2].hand[0];
    let second = env
        .game
        .move_card(&handler, second, Zone::Stack, ZonePlacement::Top, None)
        .unwrap();
    let second_id = env.game.stack.push(
        StackItemKind::Spell {
            card: second,
            card_id: BEAR,
        },
        PlayerId::P2,
        SpellContext::default(),
    );

    assert!(env.game.resolve_top_of_stack(&handler));
    assert!(env.game.stack.get(second_id).is_none(), "top resolved first");
    assert!(env.game.stack.get(first_id).is_some());
}

/// Invariant 5: one apply cannot move life by more than the damage
/// present at entry (total creature power plus stack burn). Exercised
/// with a full board swing.
#[test]
fn life_swing_bounded_by_board() {
    let mut env = env(11);
    env.step(225, &ActionContext::None);
    env.step(225, &ActionContext::None);

    // Give P1 three bears, ready to attack.
    for _ in 0..3 {
        let mut instance =
            mtg_sim::CardInstance::new(BEAR, PlayerId::P1, mtg_sim::Zone::Battlefield);
        instance.zone = mtg_sim::Zone::Battlefield;
        let h = env.game.store.alloc(instance);
        env.game.players[PlayerId::P1].battlefield.push(h);
    }
    let total_power: i32 = env.game.players[PlayerId::P1]
        .battlefield
        .iter()
        .map(|&c| env.game.power_of(c))
        .sum();
    assert_eq!(total_power, 6);

    // Walk to combat damage with all three attacking.
    let mut guard = 0;
    while env.game.phase != mtg_sim::Phase::DeclareAttackers && guard < 20 {
        env.step(11, &ActionContext::None);
        guard += 1;
    }
    for idx in [28u16, 29, 30] {
        env.step(idx, &ActionContext::None);
    }
    env.step(438, &ActionContext::None);
    env.step(439, &ActionContext::None);

    let life_before = env.game.players[PlayerId::P2].life;
    // Pass through the damage step.
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    let life_after = env.game.players[PlayerId::P2].life;

    let swing = life_before - life_after;
    assert!(swing >= 0 && swing <= total_power, "swing {swing} within bound");
}
