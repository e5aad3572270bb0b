//! Card registry: the narrow contract to the card database.
//!
//! The core looks cards up by `CardId` and reads `CardData`. How the
//! registry is populated (oracle files, test fixtures) is the caller's
//! concern.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::card::{CardData, CardId};

/// Lookup table of static card data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CardRegistry {
    cards: FxHashMap<CardId, CardData>,
}

impl CardRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card definition. Replaces any previous entry.
    pub fn register(&mut self, card: CardData) {
        self.cards.insert(card.id, card);
    }

    /// Get a card by ID.
    #[must_use]
    pub fn get(&self, id: CardId) -> Option<&CardData> {
        self.cards.get(&id)
    }

    /// Number of registered cards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
