//! Zone identifiers.
//!
//! Each player owns a library, hand, battlefield, graveyard, and exile;
//! the stack is shared. The command zone is not modelled. Cards move
//! between zones exclusively through `Game::move_card`.

use serde::{Deserialize, Serialize};

/// One of the modelled game zones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Ordered, hidden. Index 0 is the top.
    Library,
    /// Unordered with stable indices for action mapping.
    #[default]
    Hand,
    /// Unordered with stable indices for action mapping.
    Battlefield,
    /// Ordered top-to-bottom. Index 0 is the top.
    Graveyard,
    /// Stable indices for action mapping.
    Exile,
    /// Cards whose spell is on the stack.
    Stack,
}

impl Zone {
    /// Zones whose contents are public knowledge.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(
            self,
            Zone::Battlefield | Zone::Graveyard | Zone::Exile | Zone::Stack
        )
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility() {
        assert!(!Zone::Library.is_public());
        assert!(!Zone::Hand.is_public());
        assert!(Zone::Battlefield.is_public());
        assert!(Zone::Graveyard.is_public());
    }
}
