//! Slot-allocated card storage with generation stamps.
//!
//! All `CardInstance`s for a game live here. Zones hold `CardHandle`s
//! into the store; dereferencing validates the generation stamp, so a
//! handle captured before a zone change simply stops resolving instead
//! of pointing at the card's new incarnation.

use serde::{Deserialize, Serialize};

use crate::cards::CardInstance;
use crate::core::CardHandle;

/// Owns every card instance in a game.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CardStore {
    slots: Vec<Option<CardInstance>>,
    gens: Vec<u32>,
    free: Vec<u32>,
}

impl CardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a card and return its handle.
    pub fn alloc(&mut self, card: CardInstance) -> CardHandle {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(card);
            CardHandle::new(slot, self.gens[slot as usize])
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Some(card));
            self.gens.push(0);
            CardHandle::new(slot, 0)
        }
    }

    /// Dereference a handle. `None` if the generation is stale or the
    /// slot is empty.
    #[must_use]
    pub fn get(&self, handle: CardHandle) -> Option<&CardInstance> {
        if !self.is_live(handle) {
            return None;
        }
        self.slots.get(handle.slot as usize)?.as_ref()
    }

    /// Mutable dereference with the same staleness rules as `get`.
    pub fn get_mut(&mut self, handle: CardHandle) -> Option<&mut CardInstance> {
        if !self.is_live(handle) {
            return None;
        }
        self.slots.get_mut(handle.slot as usize)?.as_mut()
    }

    /// Whether the handle still refers to a live card.
    #[must_use]
    pub fn is_live(&self, handle: CardHandle) -> bool {
        self.gens.get(handle.slot as usize) == Some(&handle.gen)
            && self
                .slots
                .get(handle.slot as usize)
                .is_some_and(|s| s.is_some())
    }

    /// Bump the generation of a live card and return the fresh handle.
    ///
    /// Called on every zone change: all previously issued handles for
    /// the card go stale.
    pub fn rekey(&mut self, handle: CardHandle) -> Option<CardHandle> {
        if !self.is_live(handle) {
            return None;
        }
        let slot = handle.slot as usize;
        self.gens[slot] = self.gens[slot].wrapping_add(1);
        Some(CardHandle::new(handle.slot, self.gens[slot]))
    }

    /// Remove a card entirely (tokens ceasing to exist).
    pub fn remove(&mut self, handle: CardHandle) -> Option<CardInstance> {
        if !self.is_live(handle) {
            return None;
        }
        let slot = handle.slot as usize;
        let card = self.slots[slot].take();
        self.gens[slot] = self.gens[slot].wrapping_add(1);
        self.free.push(handle.slot);
        card
    }

    /// Number of live cards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardId;
    use crate::core::{PlayerId, Zone};

    fn card() -> CardInstance {
        CardInstance::new(CardId::new(1), PlayerId::P1, Zone::Library)
    }

    #[test]
    fn test_alloc_and_get() {
        let mut store = CardStore::new();
        let h = store.alloc(card());

        assert!(store.is_live(h));
        assert_eq!(store.get(h).unwrap().card_id, CardId::new(1));
    }

    #[test]
    fn test_rekey_invalidates_old_handle() {
        let mut store = CardStore::new();
        let old = store.alloc(card());
        let new = store.rekey(old).unwrap();

        assert!(!store.is_live(old));
        assert!(store.is_live(new));
        assert!(store.get(old).is_none());
        assert!(store.get(new).is_some());
        assert_eq!(new.slot, old.slot);
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut store = CardStore::new();
        let h = store.alloc(card());
        assert!(store.remove(h).is_some());
        assert!(store.get(h).is_none());
        assert_eq!(store.len(), 0);

        // Reused slot gets a fresh generation; the removed handle stays dead.
        let h2 = store.alloc(card());
        assert_eq!(h2.slot, h.slot);
        assert_ne!(h2.gen, h.gen);
        assert!(store.get(h).is_none());
        assert!(store.get(h2).is_some());
    }

    #[test]
    fn test_double_remove() {
        let mut store = CardStore::new();
        let h = store.alloc(card());
        assert!(store.remove(h).is_some());
        assert!(store.remove(h).is_none());
    }
}
