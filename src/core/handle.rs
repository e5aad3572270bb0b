//! Generation-stamped card handles.
//!
//! Every card in a game is addressed through a `CardHandle`: a slot in
//! the game's card store plus a generation stamp. Zone changes bump the
//! generation and issue a fresh handle, so references squirrelled away in
//! attachments, stack-item targets, or combat assignments go stale the
//! moment the permanent leaves its zone instead of silently pointing at
//! whatever occupies the slot next.
//!
//! Handles are plain data: `Copy`, hashable, serialisable. Dereferencing
//! happens through the card store, which validates the generation.

use serde::{Deserialize, Serialize};

/// A generation-stamped reference to a card in the game's card store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardHandle {
    /// Slot index in the card store.
    pub slot: u32,
    /// Generation stamp; must match the store's stamp to dereference.
    pub gen: u32,
}

impl CardHandle {
    /// Create a handle from raw parts.
    #[must_use]
    pub const fn new(slot: u32, gen: u32) -> Self {
        Self { slot, gen }
    }
}

impl std::fmt::Display for CardHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Card({}.{})", self.slot, self.gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CardHandle::new(4, 2)), "Card(4.2)");
    }

    #[test]
    fn test_equality_includes_generation() {
        assert_ne!(CardHandle::new(4, 1), CardHandle::new(4, 2));
        assert_eq!(CardHandle::new(4, 2), CardHandle::new(4, 2));
    }

    #[test]
    fn test_serialization() {
        let handle = CardHandle::new(10, 3);
        let json = serde_json::to_string(&handle).unwrap();
        let back: CardHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(handle, back);
    }
}
