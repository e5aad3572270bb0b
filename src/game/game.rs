//! The game value: both players, the stack, phase/priority state, and
//! the `move_card` lifecycle every zone change goes through.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cards::{
    CardData, CardId, CardInstance, CardRegistry, CardType, CounterKind, Keyword, TypeLine,
};
use crate::casting::PendingSpell;
use crate::choices::{ChoiceContext, SacrificeContext, TargetingContext};
use crate::combat::CombatState;
use crate::core::{CardHandle, GameRng, ManaCost, Phase, PlayerId, PlayerPair, Zone};
use crate::mulligan::MulliganState;
use crate::stack::StackEngine;

use super::events::{GameEvent, PendingTrigger};
use super::player_state::PlayerState;
use super::store::CardStore;

/// Where to place a card in an ordered zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZonePlacement {
    Top,
    Bottom,
}

/// Why a zone change failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("stale card handle")]
    StaleHandle,
}

/// A one-shot permission produced by a resolving effect, consumed by
/// the matching action index (token creation, library search, counter
/// manipulation, graveyard recursion, copies, clash).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EffectGrant {
    CreateToken { player: PlayerId, count: u8 },
    CopyPermanent { player: PlayerId },
    CopySpell { player: PlayerId },
    Populate { player: PlayerId },
    SearchLibrary { player: PlayerId },
    ReturnFromGraveyard { player: PlayerId },
    Reanimate { player: PlayerId },
    ReturnFromExile { player: PlayerId },
    AddCounter { player: PlayerId, kind: CounterKind, count: u8 },
    RemoveCounter { player: PlayerId },
    Proliferate { player: PlayerId },
    Clash { player: PlayerId },
    Discard { player: PlayerId, count: u8 },
}

impl EffectGrant {
    /// The player who acts on this grant.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        match *self {
            EffectGrant::CreateToken { player, .. }
            | EffectGrant::CopyPermanent { player }
            | EffectGrant::CopySpell { player }
            | EffectGrant::Populate { player }
            | EffectGrant::SearchLibrary { player }
            | EffectGrant::ReturnFromGraveyard { player }
            | EffectGrant::Reanimate { player }
            | EffectGrant::ReturnFromExile { player }
            | EffectGrant::AddCounter { player, .. }
            | EffectGrant::RemoveCounter { player }
            | EffectGrant::Proliferate { player }
            | EffectGrant::Clash { player }
            | EffectGrant::Discard { player, .. } => player,
        }
    }
}

/// Predefined token table for CREATE_TOKEN actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Soldier,
    Zombie,
    Saproling,
    Clue,
    Treasure,
}

impl TokenKind {
    pub const ALL: [TokenKind; 5] = [
        TokenKind::Soldier,
        TokenKind::Zombie,
        TokenKind::Saproling,
        TokenKind::Clue,
        TokenKind::Treasure,
    ];

    /// Registry ids for token definitions sit above any real card id.
    #[must_use]
    pub fn card_id(self) -> CardId {
        let offset = match self {
            TokenKind::Soldier => 0,
            TokenKind::Zombie => 1,
            TokenKind::Saproling => 2,
            TokenKind::Clue => 3,
            TokenKind::Treasure => 4,
        };
        CardId::new(1_000_000 + offset)
    }

    fn definition(self) -> CardData {
        match self {
            TokenKind::Soldier => CardData::new(
                self.card_id(),
                "Soldier Token",
                TypeLine::of(CardType::Creature).with_subtype("Soldier"),
            )
            .with_stats(1, 1),
            TokenKind::Zombie => CardData::new(
                self.card_id(),
                "Zombie Token",
                TypeLine::of(CardType::Creature).with_subtype("Zombie"),
            )
            .with_stats(2, 2),
            TokenKind::Saproling => CardData::new(
                self.card_id(),
                "Saproling Token",
                TypeLine::of(CardType::Creature).with_subtype("Saproling"),
            )
            .with_stats(1, 1),
            TokenKind::Clue => CardData::new(
                self.card_id(),
                "Clue Token",
                TypeLine::of(CardType::Artifact).with_subtype("Clue"),
            ),
            TokenKind::Treasure => CardData::new(
                self.card_id(),
                "Treasure Token",
                TypeLine::of(CardType::Artifact).with_subtype("Treasure"),
            ),
        }
    }
}

/// Result of a finished (or unfinished) game, from one seat's view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
    Error,
    Undetermined,
}

/// Start-of-game configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub starting_life: i32,
    pub max_turns: u32,
    pub max_hand_size: usize,
    /// Skip the active player's draw on turn 1.
    pub skip_first_draw: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_life: 20,
            max_turns: 100,
            max_hand_size: 7,
            skip_first_draw: true,
        }
    }
}

/// The complete game state. Owned by the caller, borrowed mutably for
/// the duration of each `apply`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Game {
    pub registry: CardRegistry,
    pub store: CardStore,
    pub players: PlayerPair<PlayerState>,
    pub stack: StackEngine,

    pub phase: Phase,
    /// Turn phase parked while a sub-phase is active.
    pub resume_phase: Option<Phase>,
    pub turn: u32,
    pub max_turns: u32,
    pub max_hand_size: usize,
    pub skip_first_draw: bool,

    pub active: PlayerId,
    pub priority: Option<PlayerId>,
    /// Consecutive priority passes on the current stack top.
    pub passes: u8,

    // Transient choice contexts: at most one active at a time.
    pub targeting: Option<TargetingContext>,
    pub sacrifice: Option<SacrificeContext>,
    pub choice: Option<ChoiceContext>,
    pub pending_spell: Option<PendingSpell>,

    pub mulligan: PlayerPair<MulliganState>,
    pub combat: CombatState,

    pub pending_triggers: Vec<PendingTrigger>,
    pub grants: Vec<EffectGrant>,

    /// Damage prevention shields per player.
    pub prevention: PlayerPair<i32>,
    /// Redirect the next damage to this permanent instead.
    pub redirect: PlayerPair<Option<CardHandle>>,

    /// Permanents that bounce to hand at end of turn (dash, blitz).
    pub return_at_eot: Vec<CardHandle>,
    /// Permanents exiled at end of turn (unearth, encore tokens).
    pub exile_at_eot: Vec<CardHandle>,

    /// A madness card just discarded, castable until the window closes.
    pub madness_window: Option<CardHandle>,
    /// Life lost by each player this turn (spectacle).
    pub life_lost_this_turn: PlayerPair<i32>,
    /// The most recent card each player drew this turn (miracle).
    pub last_drawn: PlayerPair<Option<CardHandle>>,
    /// Draw replacement offer: dredge is available this draw step.
    pub dredge_pending: bool,

    /// Consecutive effectively-idle decisions, for stuck recovery.
    pub noop_streak: u32,
    /// Set when recovery failed or a handler misbehaved.
    pub error_flagged: bool,
    pub truncated: bool,

    timestamp: u64,
    pub rng: GameRng,
}

impl Game {
    /// Build a game: register token definitions, shuffle libraries,
    /// draw opening hands, and enter the mulligan flow.
    #[must_use]
    pub fn new(
        mut registry: CardRegistry,
        config: GameConfig,
        decks: PlayerPair<Vec<CardId>>,
        seed: u64,
    ) -> Self {
        for kind in TokenKind::ALL {
            if registry.get(kind.card_id()).is_none() {
                registry.register(kind.definition());
            }
        }

        let mut game = Self {
            registry,
            store: CardStore::new(),
            players: PlayerPair::new(|_| PlayerState::new(config.starting_life)),
            stack: StackEngine::new(),
            phase: Phase::Untap,
            resume_phase: None,
            turn: 1,
            max_turns: config.max_turns,
            max_hand_size: config.max_hand_size,
            skip_first_draw: config.skip_first_draw,
            active: PlayerId::P1,
            priority: None,
            passes: 0,
            targeting: None,
            sacrifice: None,
            choice: None,
            pending_spell: None,
            mulligan: PlayerPair::with_value(MulliganState::Deciding),
            combat: CombatState::default(),
            pending_triggers: Vec::new(),
            grants: Vec::new(),
            prevention: PlayerPair::with_value(0),
            redirect: PlayerPair::with_value(None),
            return_at_eot: Vec::new(),
            exile_at_eot: Vec::new(),
            madness_window: None,
            life_lost_this_turn: PlayerPair::with_value(0),
            last_drawn: PlayerPair::with_value(None),
            dredge_pending: false,
            noop_streak: 0,
            error_flagged: false,
            truncated: false,
            timestamp: 0,
            rng: GameRng::new(seed),
        };

        for player in PlayerId::both() {
            for &card_id in &decks[player] {
                let instance = CardInstance::new(card_id, player, Zone::Library);
                let handle = game.store.alloc(instance);
                game.players[player].library.push(handle);
            }
            game.rng_shuffle_library(player);
            for _ in 0..7 {
                game.draw_silently(player);
            }
        }

        game
    }

    // === Lookups ===

    /// The card instance behind a handle, if still live.
    #[must_use]
    pub fn instance(&self, card: CardHandle) -> Option<&CardInstance> {
        self.store.get(card)
    }

    pub fn instance_mut(&mut self, card: CardHandle) -> Option<&mut CardInstance> {
        self.store.get_mut(card)
    }

    /// Static data for the card behind a handle.
    #[must_use]
    pub fn card_data(&self, card: CardHandle) -> Option<&CardData> {
        self.registry.get(self.instance(card)?.card_id)
    }

    /// The type line currently presented by a card (back face when
    /// transformed).
    #[must_use]
    pub fn type_line_of(&self, card: CardHandle) -> Option<&TypeLine> {
        let instance = self.instance(card)?;
        let data = self.registry.get(instance.card_id)?;
        if instance.transformed {
            if let Some(back) = data.back_face() {
                return Some(&back.types);
            }
        }
        Some(&data.types)
    }

    /// Whether a permanent is currently a creature. Face-down cards are
    /// 2/2 creatures by definition; an impending permanent is not a
    /// creature while its time counters last.
    #[must_use]
    pub fn is_creature(&self, card: CardHandle) -> bool {
        match self.instance(card) {
            Some(i) if i.face_down => true,
            Some(i) => {
                if i.counter(CounterKind::Time) > 0
                    && self
                        .registry
                        .get(i.card_id)
                        .is_some_and(|d| d.has_keyword(Keyword::Impending))
                {
                    return false;
                }
                self.type_line_of(card).is_some_and(TypeLine::is_creature)
            }
            None => false,
        }
    }

    /// Effective power, including counters and mutate merges.
    #[must_use]
    pub fn power_of(&self, card: CardHandle) -> i32 {
        let Some(instance) = self.instance(card) else {
            return 0;
        };
        let Some(data) = self.registry.get(instance.card_id) else {
            return 0;
        };
        let base = instance.power(data);
        let merged_best = self.merged_stat(instance, |d| d.power);
        base.max(merged_best)
    }

    /// Effective toughness, including counters and mutate merges.
    #[must_use]
    pub fn toughness_of(&self, card: CardHandle) -> i32 {
        let Some(instance) = self.instance(card) else {
            return 0;
        };
        let Some(data) = self.registry.get(instance.card_id) else {
            return 0;
        };
        let base = instance.toughness(data);
        let merged_best = self.merged_stat(instance, |d| d.toughness);
        base.max(merged_best)
    }

    fn merged_stat(&self, instance: &CardInstance, pick: impl Fn(&CardData) -> Option<i32>) -> i32 {
        self.players[instance.controller]
            .merged
            .values()
            .flatten()
            .filter_map(|id| self.registry.get(*id).and_then(&pick))
            .max()
            .unwrap_or(0)
    }

    /// Handle at a hand index.
    #[must_use]
    pub fn hand_card(&self, player: PlayerId, idx: usize) -> Option<CardHandle> {
        self.players[player].hand.get(idx).copied()
    }

    /// Handle at a battlefield index.
    #[must_use]
    pub fn battlefield_card(&self, player: PlayerId, idx: usize) -> Option<CardHandle> {
        self.players[player].battlefield.get(idx).copied()
    }

    /// Handle at a graveyard index (0 = top).
    #[must_use]
    pub fn graveyard_card(&self, player: PlayerId, idx: usize) -> Option<CardHandle> {
        self.players[player].graveyard.get(idx).copied()
    }

    /// Handle at an exile index.
    #[must_use]
    pub fn exile_card(&self, player: PlayerId, idx: usize) -> Option<CardHandle> {
        self.players[player].exile.get(idx).copied()
    }

    // === Zone movement ===

    /// Move a card between zones: the single lifecycle path.
    ///
    /// Consults the handler for replacement effects before the move,
    /// reissues the handle, performs enter-the-battlefield setup, and
    /// fires zone-change/ETB/dies events afterwards. Returns the fresh
    /// handle.
    pub fn move_card(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        card: CardHandle,
        to: Zone,
        placement: ZonePlacement,
        new_controller: Option<PlayerId>,
    ) -> Result<CardHandle, MoveError> {
        let Some(instance) = self.store.get(card) else {
            return Err(MoveError::StaleHandle);
        };
        let from = instance.zone;
        let owner = instance.owner;
        let old_controller = instance.controller;
        let card_id = instance.card_id;

        let to = handler.replacement_zone(self, card, from, to).unwrap_or(to);

        // Detach from the source zone vector and per-permanent sets.
        let source_player = if from == Zone::Battlefield {
            old_controller
        } else {
            owner
        };
        if let Some(vec) = self.players[source_player].zone_mut(from) {
            vec.retain(|&h| h != card);
        }
        if from == Zone::Battlefield {
            self.players[source_player].forget_permanent(card);
        }

        let new_handle = self.store.rekey(card).ok_or(MoveError::StaleHandle)?;
        let controller = if to == Zone::Battlefield {
            new_controller.unwrap_or(owner)
        } else {
            owner
        };
        self.timestamp += 1;
        let stamp = self.timestamp;

        let (loyalty, defense, is_class) = {
            let data = self.registry.get(card_id);
            (
                data.and_then(|d| d.loyalty),
                data.and_then(|d| d.defense),
                data.is_some_and(|d| d.types.has_subtype("Class")),
            )
        };

        {
            let instance = self
                .store
                .get_mut(new_handle)
                .ok_or(MoveError::StaleHandle)?;
            instance.zone = to;
            instance.controller = controller;
            instance.reset_on_zone_change();
            instance.timestamp = stamp;

            if to == Zone::Battlefield {
                if let Some(n) = loyalty {
                    instance.add_counters(CounterKind::Loyalty, n);
                }
                if let Some(n) = defense {
                    instance.add_counters(CounterKind::Defense, n);
                }
                if is_class {
                    instance.level = 1;
                }
            }
        }

        match to {
            Zone::Battlefield => {
                self.players[controller].battlefield.push(new_handle);
                self.players[controller].entered_this_turn.insert(new_handle);
            }
            Zone::Library => match placement {
                ZonePlacement::Top => self.players[owner].library.insert(0, new_handle),
                ZonePlacement::Bottom => self.players[owner].library.push(new_handle),
            },
            Zone::Graveyard => match placement {
                ZonePlacement::Top => self.players[owner].graveyard.insert(0, new_handle),
                ZonePlacement::Bottom => self.players[owner].graveyard.push(new_handle),
            },
            Zone::Hand => self.players[owner].hand.push(new_handle),
            Zone::Exile => self.players[owner].exile.push(new_handle),
            Zone::Stack => {}
        }

        debug!(%card_id, %from, %to, "zone change");
        self.fire_event(
            handler,
            GameEvent::ZoneChange {
                card: new_handle,
                card_id,
                from,
                to,
                controller,
            },
        );
        if to == Zone::Battlefield {
            self.fire_event(
                handler,
                GameEvent::EntersBattlefield {
                    card: new_handle,
                    card_id,
                    controller,
                },
            );
        }
        if from == Zone::Battlefield && to == Zone::Graveyard {
            self.fire_event(
                handler,
                GameEvent::Dies {
                    card: new_handle,
                    card_id,
                    controller: old_controller,
                },
            );
        }

        Ok(new_handle)
    }

    /// Fire an event: collect the triggered abilities it raises.
    pub fn fire_event(&mut self, handler: &dyn crate::rules::AbilityHandler, event: GameEvent) {
        let raised = handler.triggers_for(self, &event);
        if !raised.is_empty() {
            debug!(count = raised.len(), "triggers raised");
            self.pending_triggers.extend(raised);
        }
    }

    // === Drawing, milling, discarding ===

    /// Draw without events (opening hands).
    pub(crate) fn draw_silently(&mut self, player: PlayerId) {
        if self.players[player].library.is_empty() {
            return;
        }
        let handle = self.players[player].library.remove(0);
        if let Some(i) = self.store.get_mut(handle) {
            i.zone = Zone::Hand;
        }
        self.players[player].hand.push(handle);
    }

    /// Draw a card. Drawing from an empty library flags the loss; the
    /// SBA pass turns the flag into a game end.
    pub fn draw_card(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        player: PlayerId,
    ) -> Option<CardHandle> {
        if self.players[player].library.is_empty() {
            self.players[player].drew_from_empty = true;
            return None;
        }
        let handle = self.players[player].library[0];
        let new_handle = self
            .move_card(handler, handle, Zone::Hand, ZonePlacement::Top, None)
            .ok()?;
        self.last_drawn[player] = Some(new_handle);
        self.fire_event(handler, GameEvent::CardDrawn { player });
        Some(new_handle)
    }

    /// Mill `count` cards from the top of the library.
    pub fn mill(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        player: PlayerId,
        count: usize,
    ) {
        for _ in 0..count {
            let Some(&top) = self.players[player].library.first() else {
                return;
            };
            let _ = self.move_card(handler, top, Zone::Graveyard, ZonePlacement::Top, None);
        }
    }

    /// Discard a card from hand. Opens the madness window when the
    /// card has madness (it goes to exile instead).
    pub fn discard(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        player: PlayerId,
        card: CardHandle,
    ) -> Result<CardHandle, MoveError> {
        let card_id = self.instance(card).ok_or(MoveError::StaleHandle)?.card_id;
        let has_madness = self
            .registry
            .get(card_id)
            .is_some_and(|d| d.has_keyword(Keyword::Madness));

        let to = if has_madness {
            Zone::Exile
        } else {
            Zone::Graveyard
        };
        let new_handle = self.move_card(handler, card, to, ZonePlacement::Top, None)?;
        if has_madness {
            self.madness_window = Some(new_handle);
        }
        self.fire_event(handler, GameEvent::Discarded { card_id, player });
        Ok(new_handle)
    }

    // === Damage and life ===

    /// Deal damage to a player, honouring prevention shields, redirect
    /// effects, and lifelink on the source.
    pub fn damage_player(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        source: Option<CardHandle>,
        player: PlayerId,
        amount: i32,
    ) {
        if amount <= 0 {
            return;
        }

        if let Some(permanent) = self.redirect[player].take() {
            if self.store.is_live(permanent) {
                self.damage_permanent(handler, source, permanent, amount);
                return;
            }
        }

        let prevented = amount.min(self.prevention[player]);
        self.prevention[player] -= prevented;
        let dealt = amount - prevented;
        if dealt <= 0 {
            return;
        }

        self.players[player].life -= dealt;
        self.life_lost_this_turn[player] += dealt;
        self.fire_event(
            handler,
            GameEvent::DamageToPlayer {
                player,
                amount: dealt,
            },
        );
        self.lifelink_gain(handler, source, dealt);
    }

    /// Deal damage to a permanent: marked damage for creatures,
    /// loyalty/defense counter removal for planeswalkers and battles.
    pub fn damage_permanent(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        source: Option<CardHandle>,
        target: CardHandle,
        amount: i32,
    ) {
        if amount <= 0 || !self.store.is_live(target) {
            return;
        }

        let deathtouch = source.is_some_and(|s| {
            self.card_data(s)
                .is_some_and(|d| d.has_keyword(Keyword::Deathtouch))
        });

        let is_planeswalker = self
            .type_line_of(target)
            .is_some_and(TypeLine::is_planeswalker);
        let is_battle = self.type_line_of(target).is_some_and(TypeLine::is_battle);

        if let Some(instance) = self.store.get_mut(target) {
            if is_planeswalker {
                instance.add_counters(CounterKind::Loyalty, -amount);
            } else if is_battle {
                instance.add_counters(CounterKind::Defense, -amount);
            } else {
                instance.damage += amount;
                if deathtouch {
                    instance.deathtouch_damaged = true;
                }
            }
        }

        self.fire_event(
            handler,
            GameEvent::DamageToPermanent {
                card: target,
                amount,
            },
        );
        self.lifelink_gain(handler, source, amount);
    }

    fn lifelink_gain(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        source: Option<CardHandle>,
        amount: i32,
    ) {
        let Some(source) = source else { return };
        let has_lifelink = self
            .card_data(source)
            .is_some_and(|d| d.has_keyword(Keyword::Lifelink));
        if !has_lifelink {
            return;
        }
        let Some(controller) = self.instance(source).map(|i| i.controller) else {
            return;
        };
        self.players[controller].life += amount;
        self.fire_event(handler, GameEvent::LifeGained {
            player: controller,
            amount,
        });
    }

    // === Tokens and copies ===

    /// Create a predefined token on a player's battlefield.
    pub fn create_token(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        kind: TokenKind,
        controller: PlayerId,
    ) -> CardHandle {
        self.create_token_of(handler, kind.card_id(), controller)
    }

    /// Create a token copy of an arbitrary registered card.
    pub fn create_token_of(
        &mut self,
        handler: &dyn crate::rules::AbilityHandler,
        card_id: CardId,
        controller: PlayerId,
    ) -> CardHandle {
        let mut instance = CardInstance::new(card_id, controller, Zone::Battlefield);
        instance.is_token = true;
        self.timestamp += 1;
        instance.timestamp = self.timestamp;
        let handle = self.store.alloc(instance);
        self.players[controller].battlefield.push(handle);
        self.players[controller].entered_this_turn.insert(handle);
        self.fire_event(
            handler,
            GameEvent::EntersBattlefield {
                card: handle,
                card_id,
                controller,
            },
        );
        handle
    }

    // === Grants ===

    /// Queue a one-shot effect grant.
    pub fn push_grant(&mut self, grant: EffectGrant) {
        self.grants.push(grant);
    }

    /// The grant currently awaiting an action, if any.
    #[must_use]
    pub fn current_grant(&self) -> Option<&EffectGrant> {
        self.grants.first()
    }

    /// Consume the front grant.
    pub fn consume_grant(&mut self) -> Option<EffectGrant> {
        if self.grants.is_empty() {
            None
        } else {
            Some(self.grants.remove(0))
        }
    }

    // === Phase and priority bookkeeping ===

    /// Force priority to a player and reset the pass counter.
    pub fn assign_priority(&mut self, player: PlayerId) {
        self.priority = Some(player);
        self.passes = 0;
    }

    /// Park the turn phase and enter a sub-phase.
    pub fn enter_subphase(&mut self, sub: Phase) {
        debug_assert!(sub.is_choice() || sub == Phase::Priority);
        if self.phase.is_turn_phase() {
            self.resume_phase = Some(self.phase);
        }
        self.phase = sub;
    }

    /// Leave the current sub-phase, restoring the parked turn phase.
    pub fn leave_subphase(&mut self) {
        if let Some(prev) = self.resume_phase.take() {
            self.phase = prev;
        } else if !self.phase.is_turn_phase() {
            self.phase = Phase::MainPre;
        }
    }

    /// Empty both mana pools (step/phase boundary).
    pub fn empty_mana_pools(&mut self) {
        for player in PlayerId::both() {
            self.players[player].pool.empty();
        }
    }

    /// Whether the mulligan flow has finished for both players.
    #[must_use]
    pub fn mulligans_complete(&self) -> bool {
        PlayerId::both().all(|p| self.mulligan[p] == MulliganState::Done)
    }

    // === Game end ===

    /// Flag a player as having lost. Monotone: never cleared.
    pub fn flag_loss(&mut self, player: PlayerId) {
        self.players[player].lost_game = true;
    }

    /// Flag the game as drawn. Monotone.
    pub fn flag_draw(&mut self) {
        for player in PlayerId::both() {
            self.players[player].game_draw = true;
        }
    }

    /// Whether any end-of-game flag is set.
    #[must_use]
    pub fn is_over(&self) -> bool {
        PlayerId::both().any(|p| self.players[p].lost_game || self.players[p].game_draw)
            || self.truncated
    }

    /// The outcome from one seat's perspective.
    #[must_use]
    pub fn outcome_for(&self, player: PlayerId) -> GameOutcome {
        let me = &self.players[player];
        let them = &self.players[player.opponent()];

        if self.error_flagged {
            return GameOutcome::Error;
        }
        if me.game_draw || (me.lost_game && them.lost_game) {
            return GameOutcome::Draw;
        }
        if me.lost_game {
            return GameOutcome::Loss;
        }
        if them.lost_game {
            return GameOutcome::Win;
        }
        if self.truncated {
            // Turn limit: higher life wins.
            return match me.life.cmp(&them.life) {
                std::cmp::Ordering::Greater => GameOutcome::Win,
                std::cmp::Ordering::Less => GameOutcome::Loss,
                std::cmp::Ordering::Equal => GameOutcome::Draw,
            };
        }
        GameOutcome::Undetermined
    }

    // === RNG helpers ===

    pub fn rng_shuffle_library(&mut self, player: PlayerId) {
        let mut library = std::mem::take(&mut self.players[player].library);
        self.rng.shuffle(&mut library);
        self.players[player].library = library;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BasicAbilityHandler;

    fn test_registry() -> CardRegistry {
        let mut registry = CardRegistry::new();
        registry.register(
            CardData::new(
                CardId::new(1),
                "Bear",
                TypeLine::of(CardType::Creature).with_subtype("Bear"),
            )
            .with_cost(ManaCost::generic(2))
            .with_stats(2, 2),
        );
        registry.register(CardData::new(
            CardId::new(2),
            "Forest",
            TypeLine::of(CardType::Land).with_subtype("Forest"),
        ));
        registry
    }

    fn test_game() -> Game {
        let deck: Vec<CardId> = (0..20)
            .map(|i| CardId::new(if i % 2 == 0 { 1 } else { 2 }))
            .collect();
        Game::new(
            test_registry(),
            GameConfig::default(),
            PlayerPair::with_value(deck),
            42,
        )
    }

    #[test]
    fn test_new_game_draws_seven() {
        let game = test_game();
        for player in PlayerId::both() {
            assert_eq!(game.players[player].hand.len(), 7);
            assert_eq!(game.players[player].library.len(), 13);
            assert_eq!(game.players[player].life, 20);
        }
        assert!(!game.mulligans_complete());
    }

    #[test]
    fn test_move_card_reissues_handle() {
        let mut game = test_game();
        let handler = BasicAbilityHandler::new();
        let old = game.players[PlayerId::P1].hand[0];

        let new = game
            .move_card(&handler, old, Zone::Battlefield, ZonePlacement::Top, None)
            .unwrap();

        assert_ne!(old, new);
        assert!(game.instance(old).is_none());
        assert_eq!(game.instance(new).unwrap().zone, Zone::Battlefield);
        assert!(game.players[PlayerId::P1].battlefield.contains(&new));
        assert!(!game.players[PlayerId::P1].hand.contains(&old));
        assert!(game.players[PlayerId::P1].is_summoning_sick(new));
    }

    #[test]
    fn test_draw_from_empty_flags_loss_path() {
        let mut game = test_game();
        let handler = BasicAbilityHandler::new();
        game.players[PlayerId::P1].library.clear();

        assert!(game.draw_card(&handler, PlayerId::P1).is_none());
        assert!(game.players[PlayerId::P1].drew_from_empty);
    }

    #[test]
    fn test_damage_player_with_prevention() {
        let mut game = test_game();
        let handler = BasicAbilityHandler::new();
        game.prevention[PlayerId::P2] = 2;

        game.damage_player(&handler, None, PlayerId::P2, 5);

        assert_eq!(game.players[PlayerId::P2].life, 17);
        assert_eq!(game.prevention[PlayerId::P2], 0);
    }

    #[test]
    fn test_token_creation() {
        let mut game = test_game();
        let handler = BasicAbilityHandler::new();

        let token = game.create_token(&handler, TokenKind::Zombie, PlayerId::P1);

        assert!(game.instance(token).unwrap().is_token);
        assert_eq!(game.power_of(token), 2);
        assert!(game.players[PlayerId::P1].battlefield.contains(&token));
    }

    #[test]
    fn test_outcome_monotone_flags() {
        let mut game = test_game();
        game.flag_loss(PlayerId::P2);

        assert!(game.is_over());
        assert_eq!(game.outcome_for(PlayerId::P1), GameOutcome::Win);
        assert_eq!(game.outcome_for(PlayerId::P2), GameOutcome::Loss);
    }

    #[test]
    fn test_truncation_outcome_by_life() {
        let mut game = test_game();
        game.truncated = true;
        game.players[PlayerId::P1].life = 15;
        game.players[PlayerId::P2].life = 10;

        assert_eq!(game.outcome_for(PlayerId::P1), GameOutcome::Win);
        assert_eq!(game.outcome_for(PlayerId::P2), GameOutcome::Loss);

        game.players[PlayerId::P2].life = 15;
        assert_eq!(game.outcome_for(PlayerId::P1), GameOutcome::Draw);
    }

    #[test]
    fn test_subphase_parking() {
        let mut game = test_game();
        game.phase = Phase::MainPre;

        game.enter_subphase(Phase::Targeting);
        assert_eq!(game.phase, Phase::Targeting);
        assert_eq!(game.resume_phase, Some(Phase::MainPre));

        game.leave_subphase();
        assert_eq!(game.phase, Phase::MainPre);
        assert_eq!(game.resume_phase, None);
    }
}
