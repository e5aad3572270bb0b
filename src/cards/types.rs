//! Card types, supertypes, and subtype lines.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A card type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    Artifact,
    Battle,
    Creature,
    Enchantment,
    Instant,
    Land,
    Planeswalker,
    Sorcery,
    Kindred,
}

impl CardType {
    /// True for types that exist on the battlefield.
    #[must_use]
    pub fn is_permanent(self) -> bool {
        !matches!(self, CardType::Instant | CardType::Sorcery)
    }
}

/// A category of permanent, used for sacrifice costs and filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SacrificeFilter {
    Permanent,
    Creature,
    Artifact,
    Enchantment,
    Land,
}

/// A supertype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Supertype {
    Basic,
    Legendary,
    Snow,
    World,
}

/// The decoded type line of a card or face.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLine {
    pub supertypes: SmallVec<[Supertype; 1]>,
    pub types: SmallVec<[CardType; 2]>,
    pub subtypes: SmallVec<[String; 3]>,
}

impl TypeLine {
    /// Type line with a single card type.
    #[must_use]
    pub fn of(ty: CardType) -> Self {
        Self {
            supertypes: SmallVec::new(),
            types: SmallVec::from_slice(&[ty]),
            subtypes: SmallVec::new(),
        }
    }

    /// Add a supertype.
    #[must_use]
    pub fn with_supertype(mut self, st: Supertype) -> Self {
        self.supertypes.push(st);
        self
    }

    /// Add another card type.
    #[must_use]
    pub fn with_type(mut self, ty: CardType) -> Self {
        self.types.push(ty);
        self
    }

    /// Add a subtype.
    #[must_use]
    pub fn with_subtype(mut self, sub: impl Into<String>) -> Self {
        self.subtypes.push(sub.into());
        self
    }

    #[must_use]
    pub fn has_type(&self, ty: CardType) -> bool {
        self.types.contains(&ty)
    }

    #[must_use]
    pub fn has_supertype(&self, st: Supertype) -> bool {
        self.supertypes.contains(&st)
    }

    /// Case-insensitive subtype check.
    #[must_use]
    pub fn has_subtype(&self, sub: &str) -> bool {
        self.subtypes.iter().any(|s| s.eq_ignore_ascii_case(sub))
    }

    #[must_use]
    pub fn is_creature(&self) -> bool {
        self.has_type(CardType::Creature)
    }

    #[must_use]
    pub fn is_land(&self) -> bool {
        self.has_type(CardType::Land)
    }

    #[must_use]
    pub fn is_planeswalker(&self) -> bool {
        self.has_type(CardType::Planeswalker)
    }

    #[must_use]
    pub fn is_battle(&self) -> bool {
        self.has_type(CardType::Battle)
    }

    /// True if every type on the line is a permanent type.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.types.is_empty() && self.types.iter().all(|t| t.is_permanent())
    }

    #[must_use]
    pub fn is_instant_or_sorcery(&self) -> bool {
        self.has_type(CardType::Instant) || self.has_type(CardType::Sorcery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_types() {
        assert!(CardType::Creature.is_permanent());
        assert!(CardType::Battle.is_permanent());
        assert!(!CardType::Instant.is_permanent());
        assert!(!CardType::Sorcery.is_permanent());
    }

    #[test]
    fn test_type_line_queries() {
        let line = TypeLine::of(CardType::Creature)
            .with_supertype(Supertype::Legendary)
            .with_subtype("Ninja");

        assert!(line.is_creature());
        assert!(line.is_permanent());
        assert!(line.has_supertype(Supertype::Legendary));
        assert!(line.has_subtype("ninja"));
        assert!(!line.has_subtype("Equipment"));
    }

    #[test]
    fn test_artifact_creature() {
        let line = TypeLine::of(CardType::Artifact).with_type(CardType::Creature);
        assert!(line.is_creature());
        assert!(line.has_type(CardType::Artifact));
        assert!(line.is_permanent());
    }

    #[test]
    fn test_empty_line_is_not_permanent() {
        assert!(!TypeLine::default().is_permanent());
    }
}
