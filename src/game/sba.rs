//! State-based actions.
//!
//! One pass over the checks that run before any player would receive
//! priority: lethal damage, zero toughness, empty loyalty and defense,
//! player loss conditions, the legend and world rules, orphaned auras,
//! and tokens outside the battlefield. The dispatcher loops the pass
//! until nothing changes (with its own safety bound).

use tracing::debug;

use crate::cards::{CounterKind, Keyword, Supertype, TypeLine};
use crate::core::{CardHandle, PlayerId, Zone};
use crate::rules::AbilityHandler;

use super::game::{Game, ZonePlacement};

impl Game {
    /// Run one pass of state-based actions. Returns true if anything
    /// changed; callers loop until quiescent.
    pub fn run_sbas(&mut self, handler: &dyn AbilityHandler) -> bool {
        let mut changed = false;

        // Player loss conditions.
        for player in PlayerId::both() {
            let p = &self.players[player];
            if !p.lost_game && (p.life <= 0 || p.drew_from_empty) {
                debug!(%player, life = p.life, "player loses");
                self.flag_loss(player);
                changed = true;
            }
        }

        // Permanents that must leave the battlefield.
        let mut to_graveyard: Vec<CardHandle> = Vec::new();
        for player in PlayerId::both() {
            for &card in &self.players[player].battlefield {
                if self.is_creature(card) {
                    let toughness = self.toughness_of(card);
                    if toughness <= 0 {
                        to_graveyard.push(card);
                        continue;
                    }
                    let instance = match self.instance(card) {
                        Some(i) => i,
                        None => continue,
                    };
                    let lethal = instance.damage >= toughness
                        || (instance.deathtouch_damaged && instance.damage > 0);
                    if lethal && !handler.has_keyword(self, card, Keyword::Indestructible) {
                        to_graveyard.push(card);
                        continue;
                    }
                }

                let line = self.type_line_of(card);
                if line.is_some_and(TypeLine::is_planeswalker)
                    && self.instance(card).is_some_and(|i| i.loyalty() <= 0)
                {
                    to_graveyard.push(card);
                    continue;
                }
                if line.is_some_and(TypeLine::is_battle)
                    && self.instance(card).is_some_and(|i| i.defense() <= 0)
                {
                    to_graveyard.push(card);
                    continue;
                }

                // Aura whose host is gone.
                if self.card_data(card).is_some_and(|d| d.is_aura()) {
                    let orphaned = match self.players[player].attachments.get(&card) {
                        Some(&host) => !self.store.is_live(host),
                        None => true,
                    };
                    if orphaned {
                        to_graveyard.push(card);
                    }
                }
            }
        }

        to_graveyard.extend(self.legend_rule_victims());
        to_graveyard.extend(self.world_rule_victims());
        to_graveyard.sort_by_key(|h| (h.slot, h.gen));
        to_graveyard.dedup();

        for card in to_graveyard {
            if self.store.is_live(card) {
                let _ = self.move_card(handler, card, Zone::Graveyard, ZonePlacement::Top, None);
                changed = true;
            }
        }

        // Tokens cease to exist anywhere but the battlefield.
        for player in PlayerId::both() {
            for zone in [Zone::Hand, Zone::Graveyard, Zone::Exile, Zone::Library] {
                let dead: Vec<CardHandle> = self.players[player]
                    .zone(zone)
                    .iter()
                    .copied()
                    .filter(|&h| self.instance(h).is_some_and(|i| i.is_token))
                    .collect();
                for token in dead {
                    if let Some(vec) = self.players[player].zone_mut(zone) {
                        vec.retain(|&h| h != token);
                    }
                    self.store.remove(token);
                    changed = true;
                }
            }
        }

        changed
    }

    /// Legendary permanents sharing a name under one controller: all
    /// but the newest go.
    fn legend_rule_victims(&self) -> Vec<CardHandle> {
        let mut victims = Vec::new();
        for player in PlayerId::both() {
            let legends: Vec<(CardHandle, &str, u64)> = self.players[player]
                .battlefield
                .iter()
                .filter_map(|&h| {
                    let data = self.card_data(h)?;
                    if data.types.has_supertype(Supertype::Legendary) {
                        Some((h, data.name.as_str(), self.instance(h)?.timestamp))
                    } else {
                        None
                    }
                })
                .collect();

            for &(card, name, stamp) in &legends {
                let newest = legends
                    .iter()
                    .filter(|(_, n, _)| *n == name)
                    .map(|&(_, _, s)| s)
                    .max()
                    .unwrap_or(stamp);
                if stamp < newest {
                    victims.push(card);
                }
            }
        }
        victims
    }

    /// World permanents across both players: all but the newest go.
    fn world_rule_victims(&self) -> Vec<CardHandle> {
        let worlds: Vec<(CardHandle, u64)> = PlayerId::both()
            .flat_map(|p| self.players[p].battlefield.iter().copied())
            .filter_map(|h| {
                let data = self.card_data(h)?;
                if data.types.has_supertype(Supertype::World) {
                    Some((h, self.instance(h)?.timestamp))
                } else {
                    None
                }
            })
            .collect();

        let Some(newest) = worlds.iter().map(|&(_, s)| s).max() else {
            return Vec::new();
        };
        worlds
            .into_iter()
            .filter(|&(_, s)| s < newest)
            .map(|(h, _)| h)
            .collect()
    }

    /// Wipe marked damage from every permanent (cleanup, end of a
    /// damage step's aftermath).
    pub fn wipe_damage(&mut self) {
        for player in PlayerId::both() {
            let battlefield = self.players[player].battlefield.clone();
            for card in battlefield {
                if let Some(instance) = self.store.get_mut(card) {
                    instance.damage = 0;
                    instance.deathtouch_damaged = false;
                }
            }
        }
    }

    /// Remove a counter of any existing kind from each permanent that
    /// has one, and extend loyalty/defense where present (proliferate
    /// picks the beneficial direction for the controller's own
    /// permanents and the harmful one for counters like -1/-1).
    pub fn proliferate(&mut self, _for_player: PlayerId) {
        for player in PlayerId::both() {
            let battlefield = self.players[player].battlefield.clone();
            for card in battlefield {
                let kinds: Vec<CounterKind> = match self.instance(card) {
                    Some(i) => i.counters.keys().copied().collect(),
                    None => continue,
                };
                if let Some(instance) = self.store.get_mut(card) {
                    for kind in kinds {
                        instance.add_counters(kind, 1);
                    }
                }
            }
        }
    }
}
