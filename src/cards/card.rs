//! Static card data.
//!
//! `CardData` is the read-only record the card database hands the core:
//! type line, printed power/toughness, structured costs, keyword set,
//! and faces for multi-faced layouts. Oracle text rides along as an
//! opaque string for the ability interpreter; the core never parses it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{Color, ManaCost};

use super::keywords::{Keyword, KeywordSet};
use super::types::{CardType, SacrificeFilter, TypeLine};

/// Identifier into the card registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(pub u32);

impl CardId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Card#{}", self.0)
    }
}

/// Physical layout of a card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardLayout {
    #[default]
    Normal,
    /// Modal double-faced card; the back is separately playable.
    Mdfc,
    /// Transforming double-faced card.
    Transform,
    /// Two halves, castable separately or fused.
    Split,
    /// Creature with an Adventure face.
    Adventure,
    /// Sorcery half castable from the graveyard.
    Aftermath,
    /// Flip card (single face, flips in place).
    Flip,
}

/// One face of a multi-faced card.
///
/// For `Split` the faces are left/right; for `Mdfc`/`Transform` front
/// and back; for `Adventure` the creature and the adventure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardFace {
    pub name: String,
    pub types: TypeLine,
    pub mana_cost: ManaCost,
    pub power: Option<i32>,
    pub toughness: Option<i32>,
}

impl CardFace {
    #[must_use]
    pub fn new(name: impl Into<String>, types: TypeLine, mana_cost: ManaCost) -> Self {
        Self {
            name: name.into(),
            types,
            mana_cost,
            power: None,
            toughness: None,
        }
    }

    #[must_use]
    pub fn with_stats(mut self, power: i32, toughness: i32) -> Self {
        self.power = Some(power);
        self.toughness = Some(toughness);
        self
    }
}

/// Modal spell shape: how many modes exist and how many to choose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSpec {
    pub available: u8,
    pub min: u8,
    pub max: u8,
}

/// What a mana ability produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManaProduce {
    Color(Color),
    Colorless,
}

/// A declared activated ability.
///
/// The ability interpreter owns the semantics; this record carries only
/// what legality checks need: the cost, speed restriction, and whether
/// the ability is a mana ability (usable without priority, off-stack).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbilityData {
    pub cost: ManaCost,
    /// Whether activation requires tapping the source.
    pub tap_cost: bool,
    /// Mana abilities bypass the stack and priority.
    pub produces: Option<ManaProduce>,
    /// Loyalty delta for planeswalker abilities (`None` otherwise).
    pub loyalty_delta: Option<i8>,
    pub is_ultimate: bool,
    /// Activate only at sorcery speed.
    pub sorcery_only: bool,
}

impl AbilityData {
    /// A tap-for-mana ability.
    #[must_use]
    pub fn mana(produces: ManaProduce) -> Self {
        Self {
            cost: ManaCost::free(),
            tap_cost: true,
            produces: Some(produces),
            loyalty_delta: None,
            is_ultimate: false,
            sorcery_only: false,
        }
    }

    /// A non-mana activated ability with the given cost.
    #[must_use]
    pub fn activated(cost: ManaCost, tap_cost: bool) -> Self {
        Self {
            cost,
            tap_cost,
            produces: None,
            loyalty_delta: None,
            is_ultimate: false,
            sorcery_only: false,
        }
    }

    /// A planeswalker loyalty ability.
    #[must_use]
    pub fn loyalty(delta: i8) -> Self {
        Self {
            cost: ManaCost::free(),
            tap_cost: false,
            produces: None,
            loyalty_delta: Some(delta),
            is_ultimate: false,
            sorcery_only: true,
        }
    }

    #[must_use]
    pub fn ultimate(mut self) -> Self {
        self.is_ultimate = true;
        self
    }

    #[must_use]
    pub fn is_mana_ability(&self) -> bool {
        self.produces.is_some()
    }

    #[must_use]
    pub fn is_loyalty(&self) -> bool {
        self.loyalty_delta.is_some()
    }
}

/// Static data for one card.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardData {
    pub id: CardId,
    pub name: String,
    pub types: TypeLine,
    pub mana_cost: ManaCost,
    pub power: Option<i32>,
    pub toughness: Option<i32>,
    /// Starting loyalty for planeswalkers.
    pub loyalty: Option<i32>,
    /// Starting defense for battles.
    pub defense: Option<i32>,
    pub keywords: KeywordSet,
    /// Colours this card has protection from.
    pub protection_from: SmallVec<[Color; 1]>,
    /// Cost table for keyworded alternative/attachment costs
    /// (flashback, escape, ninjutsu, equip-as-reconfigure, ...).
    pub keyword_costs: FxHashMap<Keyword, ManaCost>,
    /// Equip cost for Equipment, fortify cost for Fortifications.
    pub attach_cost: Option<ManaCost>,
    pub layout: CardLayout,
    pub faces: SmallVec<[CardFace; 2]>,
    /// Modal spell shape ("choose one", spree, escalate base).
    pub modes: Option<ModeSpec>,
    /// Additional cost: sacrifice a permanent of this category.
    pub additional_sacrifice: Option<SacrificeFilter>,
    /// Class enchantments: cost to reach level 2, then level 3.
    pub level_costs: SmallVec<[ManaCost; 2]>,
    pub abilities: Vec<AbilityData>,
    /// Opaque rules text for the ability interpreter.
    pub oracle_text: String,
}

impl CardData {
    #[must_use]
    pub fn new(id: CardId, name: impl Into<String>, types: TypeLine) -> Self {
        Self {
            id,
            name: name.into(),
            types,
            mana_cost: ManaCost::free(),
            power: None,
            toughness: None,
            loyalty: None,
            defense: None,
            keywords: KeywordSet::default(),
            protection_from: SmallVec::new(),
            keyword_costs: FxHashMap::default(),
            attach_cost: None,
            layout: CardLayout::Normal,
            faces: SmallVec::new(),
            modes: None,
            additional_sacrifice: None,
            level_costs: SmallVec::new(),
            abilities: Vec::new(),
            oracle_text: String::new(),
        }
    }

    #[must_use]
    pub fn with_cost(mut self, cost: ManaCost) -> Self {
        self.mana_cost = cost;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, power: i32, toughness: i32) -> Self {
        self.power = Some(power);
        self.toughness = Some(toughness);
        self
    }

    #[must_use]
    pub fn with_loyalty(mut self, loyalty: i32) -> Self {
        self.loyalty = Some(loyalty);
        self
    }

    #[must_use]
    pub fn with_defense(mut self, defense: i32) -> Self {
        self.defense = Some(defense);
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, keyword: Keyword) -> Self {
        self.keywords.insert(keyword);
        self
    }

    #[must_use]
    pub fn with_keyword_cost(mut self, keyword: Keyword, cost: ManaCost) -> Self {
        self.keywords.insert(keyword);
        self.keyword_costs.insert(keyword, cost);
        self
    }

    #[must_use]
    pub fn with_protection_from(mut self, color: Color) -> Self {
        self.protection_from.push(color);
        self
    }

    #[must_use]
    pub fn with_attach_cost(mut self, cost: ManaCost) -> Self {
        self.attach_cost = Some(cost);
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: CardLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_level_cost(mut self, cost: ManaCost) -> Self {
        self.level_costs.push(cost);
        self
    }

    #[must_use]
    pub fn with_additional_sacrifice(mut self, filter: SacrificeFilter) -> Self {
        self.additional_sacrifice = Some(filter);
        self
    }

    #[must_use]
    pub fn with_modes(mut self, available: u8, min: u8, max: u8) -> Self {
        self.modes = Some(ModeSpec {
            available,
            min,
            max,
        });
        self
    }

    #[must_use]
    pub fn with_face(mut self, face: CardFace) -> Self {
        self.faces.push(face);
        self
    }

    #[must_use]
    pub fn with_ability(mut self, ability: AbilityData) -> Self {
        self.abilities.push(ability);
        self
    }

    #[must_use]
    pub fn with_oracle_text(mut self, text: impl Into<String>) -> Self {
        self.oracle_text = text.into();
        self
    }

    #[must_use]
    pub fn has_keyword(&self, keyword: Keyword) -> bool {
        self.keywords.contains(&keyword)
    }

    /// Cost attached to a keyword mechanic, if declared.
    #[must_use]
    pub fn keyword_cost(&self, keyword: Keyword) -> Option<ManaCost> {
        self.keyword_costs.get(&keyword).copied()
    }

    /// Converted mana cost of the front face.
    #[must_use]
    pub fn cmc(&self) -> u32 {
        self.mana_cost.cmc()
    }

    /// Colours of this card, derived from its cost pips.
    #[must_use]
    pub fn colors(&self) -> SmallVec<[Color; 2]> {
        Color::ALL
            .iter()
            .copied()
            .filter(|&c| self.mana_cost.pips(c) > 0)
            .collect()
    }

    /// The back face of an MDFC/transform card, if any.
    #[must_use]
    pub fn back_face(&self) -> Option<&CardFace> {
        match self.layout {
            CardLayout::Mdfc | CardLayout::Transform => self.faces.get(1),
            _ => None,
        }
    }

    /// The adventure face, if this is an adventure card.
    #[must_use]
    pub fn adventure_face(&self) -> Option<&CardFace> {
        match self.layout {
            CardLayout::Adventure => self.faces.get(1),
            _ => None,
        }
    }

    /// Split halves (left, right), if this is a split card.
    #[must_use]
    pub fn split_halves(&self) -> Option<(&CardFace, &CardFace)> {
        match self.layout {
            CardLayout::Split | CardLayout::Aftermath => {
                Some((self.faces.first()?, self.faces.get(1)?))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_creature(&self) -> bool {
        self.types.is_creature()
    }

    #[must_use]
    pub fn is_land(&self) -> bool {
        self.types.is_land()
    }

    /// Equipment subtype check.
    #[must_use]
    pub fn is_equipment(&self) -> bool {
        self.types.has_type(CardType::Artifact) && self.types.has_subtype("Equipment")
    }

    #[must_use]
    pub fn is_aura(&self) -> bool {
        self.types.has_type(CardType::Enchantment) && self.types.has_subtype("Aura")
    }

    #[must_use]
    pub fn is_fortification(&self) -> bool {
        self.types.has_type(CardType::Artifact) && self.types.has_subtype("Fortification")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::types::Supertype;

    #[test]
    fn test_builder() {
        let card = CardData::new(
            CardId::new(1),
            "Grizzly Bears",
            TypeLine::of(CardType::Creature).with_subtype("Bear"),
        )
        .with_cost(ManaCost::generic(1).with_pips(Color::Green, 1))
        .with_stats(2, 2);

        assert_eq!(card.cmc(), 2);
        assert_eq!(card.power, Some(2));
        assert!(card.is_creature());
        assert!(!card.is_land());
    }

    #[test]
    fn test_keyword_cost() {
        let card = CardData::new(
            CardId::new(2),
            "Deep Analysis",
            TypeLine::of(CardType::Sorcery),
        )
        .with_keyword_cost(Keyword::Flashback, ManaCost::generic(1).with_pips(Color::Blue, 1));

        assert!(card.has_keyword(Keyword::Flashback));
        assert_eq!(
            card.keyword_cost(Keyword::Flashback).map(|c| c.cmc()),
            Some(2)
        );
        assert_eq!(card.keyword_cost(Keyword::Escape), None);
    }

    #[test]
    fn test_mdfc_back_face() {
        let card = CardData::new(
            CardId::new(3),
            "Sink into Stupor",
            TypeLine::of(CardType::Instant),
        )
        .with_layout(CardLayout::Mdfc)
        .with_face(CardFace::new(
            "Sink into Stupor",
            TypeLine::of(CardType::Instant),
            ManaCost::generic(2).with_pips(Color::Blue, 1),
        ))
        .with_face(CardFace::new(
            "Soporific Springs",
            TypeLine::of(CardType::Land),
            ManaCost::free(),
        ));

        let back = card.back_face().unwrap();
        assert!(back.types.is_land());
    }

    #[test]
    fn test_equipment_subtype() {
        let card = CardData::new(
            CardId::new(4),
            "Short Sword",
            TypeLine::of(CardType::Artifact).with_subtype("Equipment"),
        )
        .with_attach_cost(ManaCost::generic(1));

        assert!(card.is_equipment());
        assert!(!card.is_aura());
    }

    #[test]
    fn test_legendary_supertype() {
        let card = CardData::new(
            CardId::new(5),
            "Isamaru, Hound of Konda",
            TypeLine::of(CardType::Creature)
                .with_supertype(Supertype::Legendary)
                .with_subtype("Dog"),
        );
        assert!(card.types.has_supertype(Supertype::Legendary));
    }
}
