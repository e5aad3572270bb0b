//! End-to-end scenario tests driven through the action surface.
//!
//! Each scenario builds an environment, walks it with action indices
//! the way an agent would, and checks the observable state afterwards.

use mtg_sim::{
    ActionContext, CardData, CardId, CardRegistry, CardType, Color, GameOutcome, Keyword,
    ManaCost, MtgEnv, Phase, PlayerId, ResponseRole, SimpleEffect, TypeLine,
};
use mtg_sim::cards::{AbilityData, ManaProduce};
use mtg_sim::rules::BasicAbilityHandler;

const FOREST: CardId = CardId::new(1);
const BEAR: CardId = CardId::new(2);
const COUNTERSPELL: CardId = CardId::new(3);
const FENCING_ACE: CardId = CardId::new(4);
const HILL_GIANT: CardId = CardId::new(5);
const PREORDAIN: CardId = CardId::new(6);

fn registry() -> CardRegistry {
    let mut r = CardRegistry::new();
    r.register(
        CardData::new(FOREST, "Forest", TypeLine::of(CardType::Land).with_subtype("Forest"))
            .with_ability(AbilityData::mana(ManaProduce::Color(Color::Green))),
    );
    r.register(
        CardData::new(BEAR, "Grizzly Bears", TypeLine::of(CardType::Creature))
            .with_cost(ManaCost::generic(2))
            .with_stats(2, 2),
    );
    r.register(
        CardData::new(COUNTERSPELL, "Cancel", TypeLine::of(CardType::Instant))
            .with_cost(ManaCost::free()),
    );
    r.register(
        CardData::new(FENCING_ACE, "Fencing Ace", TypeLine::of(CardType::Creature))
            .with_cost(ManaCost::generic(1))
            .with_stats(2, 2)
            .with_keyword(Keyword::FirstStrike),
    );
    r.register(
        CardData::new(HILL_GIANT, "Hill Giant", TypeLine::of(CardType::Creature))
            .with_cost(ManaCost::generic(3))
            .with_stats(3, 3),
    );
    r.register(
        CardData::new(PREORDAIN, "Preordain", TypeLine::of(CardType::Sorcery))
            .with_cost(ManaCost::free()),
    );
    r
}

fn handler() -> BasicAbilityHandler {
    let mut h = BasicAbilityHandler::new();
    h.register_response(COUNTERSPELL, ResponseRole::CounterSpell);
    h.register_effect(PREORDAIN, SimpleEffect::Scry { count: 2 });
    h
}

fn env_with_decks(seed: u64) -> MtgEnv {
    let deck: Vec<CardId> = (0..30)
        .map(|i| if i % 2 == 0 { FOREST } else { BEAR })
        .collect();
    MtgEnv::builder(registry())
        .deck(PlayerId::P1, deck.clone())
        .deck(PlayerId::P2, deck)
        .ability_handler(Box::new(handler()))
        .build(seed)
}

/// Keep both hands and walk to P1's first main phase.
fn to_main_phase(env: &mut MtgEnv) {
    env.step(225, &ActionContext::None); // P1 keeps
    env.step(225, &ActionContext::None); // P2 keeps
    let mut guard = 0;
    while env.game.phase != Phase::MainPre && guard < 10 {
        env.step(11, &ActionContext::None);
        guard += 1;
    }
    assert_eq!(env.game.phase, Phase::MainPre);
    assert_eq!(env.game.priority, Some(PlayerId::P1));
}

/// Overwrite a player's hand with specific cards.
fn set_hand(env: &mut MtgEnv, player: PlayerId, cards: &[CardId]) {
    let hand = env.game.players[player].hand.clone();
    for (i, &handle) in hand.iter().enumerate() {
        if let Some(&card_id) = cards.get(i) {
            env.game.store.get_mut(handle).unwrap().card_id = card_id;
        }
    }
}

/// Put a creature straight onto a battlefield, past summoning sickness.
fn put_creature(env: &mut MtgEnv, player: PlayerId, card_id: CardId) -> mtg_sim::CardHandle {
    let mut instance = mtg_sim::CardInstance::new(card_id, player, mtg_sim::Zone::Battlefield);
    instance.zone = mtg_sim::Zone::Battlefield;
    let handle = env.game.store.alloc(instance);
    env.game.players[player].battlefield.push(handle);
    handle
}

// =============================================================================
// S1: Land + pass
// =============================================================================

#[test]
fn s1_land_play_and_phase_advance() {
    let mut env = env_with_decks(101);
    to_main_phase(&mut env);
    set_hand(&mut env, PlayerId::P1, &[FOREST, BEAR, BEAR, BEAR, BEAR, BEAR, BEAR]);

    let mask = env.action_mask();
    assert!(mask.allowed(13), "PLAY_LAND(0) must be legal");

    let result = env.step(13, &ActionContext::None);
    assert!(result.info.error_message.is_none());

    // Forest on the battlefield, land drop spent.
    assert_eq!(env.game.players[PlayerId::P1].battlefield.len(), 1);
    assert!(env.game.players[PlayerId::P1].land_played);

    let mask = env.action_mask();
    for idx in 13..20 {
        assert!(!mask.allowed(idx), "no second land drop at {idx}");
    }

    // Two passes advance out of the main phase.
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::BeginCombat);
}

// =============================================================================
// S2: Counter sequence
// =============================================================================

#[test]
fn s2_counterspell_lifo() {
    let mut env = env_with_decks(102);
    to_main_phase(&mut env);
    set_hand(&mut env, PlayerId::P1, &[BEAR; 7]);
    set_hand(&mut env, PlayerId::P2, &[COUNTERSPELL; 7]);

    // Mana for the bear.
    put_creature(&mut env, PlayerId::P1, FOREST);
    put_creature(&mut env, PlayerId::P1, FOREST);

    // P1 casts the bear.
    let result = env.step(20, &ActionContext::None);
    assert!(result.info.error_message.is_none(), "{:?}", result.info.error_message);
    assert_eq!(env.game.stack.len(), 1);

    // P1 passes; P2 counters.
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.priority, Some(PlayerId::P2));
    let mask = env.action_mask();
    assert!(mask.allowed(430), "counter-spell response available");

    let result = env.step(
        430,
        &ActionContext::Response {
            hand_idx: 0,
            target_stack_idx: 0,
        },
    );
    assert!(result.info.error_message.is_none());
    assert_eq!(env.game.stack.len(), 2);

    // Both pass: the counter resolves first (LIFO) and takes the bear
    // with it.
    env.step(11, &ActionContext::None); // P2
    env.step(11, &ActionContext::None); // P1

    assert_eq!(env.game.stack.len(), 0, "both items gone");
    assert_eq!(
        env.game.players[PlayerId::P1].graveyard.len(),
        1,
        "bear countered into graveyard"
    );
    assert!(
        env.game.players[PlayerId::P1]
            .battlefield
            .iter()
            .all(|&c| env.game.card_data(c).is_some_and(|d| d.is_land())),
        "no creature resolved"
    );
    assert_eq!(env.game.players[PlayerId::P1].life, 20);
    assert_eq!(env.game.players[PlayerId::P2].life, 20);
}

// =============================================================================
// S3: Combat with first strike
// =============================================================================

#[test]
fn s3_first_strike_combat() {
    let mut env = env_with_decks(103);
    to_main_phase(&mut env);

    let ace = put_creature(&mut env, PlayerId::P1, FENCING_ACE);
    let giant = put_creature(&mut env, PlayerId::P2, HILL_GIANT);

    // To declare attackers.
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::BeginCombat);
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::DeclareAttackers);

    // Attack with the first striker; commit.
    let result = env.step(28, &ActionContext::None);
    assert!(result.info.error_message.is_none());
    env.step(438, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::DeclareBlockers);

    // P2 blocks with the giant; commit.
    let result = env.step(48, &ActionContext::Block { attacker_idx: 0 });
    assert!(result.info.error_message.is_none());
    env.step(439, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::FirstStrikeDamage);

    // First-strike damage: both pass through the step.
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::CombatDamage);
    assert_eq!(
        env.game.instance(giant).unwrap().damage,
        2,
        "giant took first-strike damage"
    );
    assert!(env.game.instance(ace).is_some(), "no return damage yet");

    // Normal damage: the giant strikes back and kills the ace.
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);

    assert!(env.game.instance(ace).is_none(), "ace died");
    assert_eq!(env.game.players[PlayerId::P1].graveyard.len(), 1);
    assert!(env.game.instance(giant).is_some(), "giant survived at 3/1");
    assert_eq!(env.game.players[PlayerId::P2].life, 20);
}

// =============================================================================
// S4: Mulligan bottoming
// =============================================================================

#[test]
fn s4_mulligan_bottoms_one() {
    let mut env = env_with_decks(104);

    // P1 mulligans once: hand size is still 7 after the redraw.
    env.step(6, &ActionContext::None);
    assert_eq!(env.game.players[PlayerId::P1].hand.len(), 7);

    // On keep, P1 must bottom exactly one card.
    env.step(225, &ActionContext::None);
    let mask = env.action_mask();
    for idx in 226..230 {
        assert!(mask.allowed(idx), "BOTTOM_CARD({}) offered", idx - 226);
    }
    assert!(!mask.allowed(225));

    env.step(226, &ActionContext::None);
    assert_eq!(env.game.players[PlayerId::P1].hand.len(), 6);
    assert_eq!(env.game.bottoming_remaining(PlayerId::P1), 0);
}

// =============================================================================
// S5: Scry 2
// =============================================================================

#[test]
fn s5_scry_two_ordering() {
    let mut env = env_with_decks(105);
    to_main_phase(&mut env);
    set_hand(&mut env, PlayerId::P1, &[PREORDAIN; 7]);

    let x = env.game.players[PlayerId::P1].library[0];
    let y = env.game.players[PlayerId::P1].library[1];

    // Cast and resolve the scry spell.
    let result = env.step(20, &ActionContext::None);
    assert!(result.info.error_message.is_none());
    env.step(11, &ActionContext::None);
    env.step(11, &ActionContext::None);
    assert_eq!(env.game.phase, Phase::Choose, "scry protocol open");

    // X stays on top; Y goes to the bottom.
    let mask = env.action_mask();
    assert!(mask.allowed(306));
    assert!(mask.allowed(307));
    env.step(306, &ActionContext::None);
    env.step(307, &ActionContext::None);

    let library = &env.game.players[PlayerId::P1].library;
    assert_eq!(library[0], x, "X back on top");
    assert_eq!(*library.last().unwrap(), y, "Y on the bottom");
    assert!(env.game.choice.is_none());
}

// =============================================================================
// S6: Turn-limit truncation
// =============================================================================

#[test]
fn s6_turn_limit_truncates() {
    let deck: Vec<CardId> = (0..30)
        .map(|i| if i % 2 == 0 { FOREST } else { BEAR })
        .collect();
    let mut env = MtgEnv::builder(registry())
        .deck(PlayerId::P1, deck.clone())
        .deck(PlayerId::P2, deck)
        .max_turns(10)
        .build(106);

    env.step(225, &ActionContext::None);
    env.step(225, &ActionContext::None);

    // Drive by passing priority (or the only offered action) until the
    // game truncates.
    let mut last = None;
    for _ in 0..2000 {
        let mask = env.action_mask();
        let action = if mask.allowed(11) {
            11
        } else {
            mask.set_indices().next().unwrap()
        };
        let result = env.step(action, &ActionContext::None);
        let done = result.truncated || result.done;
        last = Some(result);
        if done {
            break;
        }
    }

    let last = last.expect("game stepped");
    assert!(last.truncated, "turn limit must truncate");
    assert!(env.game.turn <= 10);
    // Untouched life totals: a draw.
    assert_eq!(last.info.game_result, Some(GameOutcome::Draw));
}
