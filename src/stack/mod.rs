//! The stack: pending spells, abilities, and triggers.
//!
//! Items resolve in LIFO order when both players pass priority. The
//! engine here is pure bookkeeping: push, pop, lookup, split-second
//! gating. Resolution semantics live with the dispatcher's post-action
//! loop, which owns the game and the ability handler.

mod resolution;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::cards::CardId;
use crate::core::{CardHandle, PlayerId, Zone};

/// How a spell was cast. Drives cost selection at cast time and the
/// card's destination after resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastMethod {
    #[default]
    Normal,
    /// Back face of an MDFC.
    MdfcBack,
    /// Adventure half of an adventure card.
    Adventure,
    /// Left / right half of a split card, or both fused.
    LeftHalf,
    RightHalf,
    Fuse,
    /// Aftermath half from the graveyard.
    Aftermath,
    Flashback,
    JumpStart,
    Escape,
    Madness,
    Overload,
    Emerge,
    Delve,
    Disturb,
    Dash,
    Spectacle,
    Bestow,
    Blitz,
    Eternalize,
    Embalm,
    Reinforce,
    Channel,
    Transmute,
    Forecast,
    Suspend,
    Unearth,
    Encore,
    Evoke,
    Miracle,
    Foretell,
    Impending,
    /// Cast from exile (adventure/foretell/suspend follow-up).
    FromExile,
}

impl CastMethod {
    /// Where the card goes after resolution instead of the default
    /// graveyard, if this cost replaces it.
    #[must_use]
    pub fn post_resolution_zone(self) -> Option<Zone> {
        match self {
            CastMethod::Flashback
            | CastMethod::JumpStart
            | CastMethod::Aftermath
            | CastMethod::Disturb
            | CastMethod::Escape
            | CastMethod::Adventure => Some(Zone::Exile),
            _ => None,
        }
    }

    /// Methods whose source zone is the graveyard.
    #[must_use]
    pub fn casts_from_graveyard(self) -> bool {
        matches!(
            self,
            CastMethod::Flashback
                | CastMethod::JumpStart
                | CastMethod::Escape
                | CastMethod::Aftermath
                | CastMethod::Disturb
                | CastMethod::Unearth
                | CastMethod::Encore
                | CastMethod::Eternalize
                | CastMethod::Embalm
        )
    }
}

/// A chosen target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    Player(PlayerId),
    Card(CardHandle),
    /// A stack item, by id.
    StackItem(u32),
}

/// Built-in response semantics the core resolves itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Remove target spell from the stack.
    CounterSpell { target: u32 },
    /// Remove target activated ability from the stack.
    CounterAbility { target: u32 },
    /// Remove target triggered ability from the stack.
    Stifle { target: u32 },
    /// Shield the controller from the next N damage this turn.
    PreventDamage { amount: i32 },
    /// Redirect the next damage that would hit the controller to a
    /// permanent target instead.
    RedirectDamage,
}

/// Typed per-item context: chosen targets, modes, costs, and markers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellContext {
    pub targets: SmallVec<[TargetRef; 4]>,
    /// Chosen mode indices for modal spells (includes spree modes).
    pub modes: SmallVec<[u8; 4]>,
    pub x: Option<u32>,
    /// Permanents sacrificed as an additional cost.
    pub sacrificed: SmallVec<[CardHandle; 2]>,
    pub kicked: bool,
    /// Extra modes paid for with escalate.
    pub escalate: u8,
    /// A token copy is created on resolution.
    pub offspring: bool,
    /// Impending: enters with this many time counters.
    pub impending: Option<u8>,
    pub is_copy: bool,
    /// Targets may be re-chosen when the copy resolves.
    pub needs_new_targets: bool,
    /// The targeting protocol has completed for this item.
    pub targets_chosen: bool,
    pub cast_method: CastMethod,
    /// Colour chosen for "choose a colour" effects.
    pub chosen_color: Option<crate::core::Color>,
    /// Zone the card was cast from.
    pub source_zone: Zone,
    /// Item carries split second: while on the stack, only mana
    /// abilities and special actions are legal.
    pub split_second: bool,
    /// Cast face-down (morph).
    pub face_down: bool,
    pub response: Option<ResponseKind>,
}

impl SpellContext {
    #[must_use]
    pub fn for_method(method: CastMethod, source_zone: Zone) -> Self {
        Self {
            cast_method: method,
            source_zone,
            ..Self::default()
        }
    }
}

/// What kind of object a stack item is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StackItemKind {
    Spell {
        card: CardHandle,
        card_id: CardId,
    },
    Ability {
        source: CardHandle,
        ability_idx: u8,
    },
    Trigger {
        source: CardHandle,
        trigger_id: u16,
    },
}

/// One item on the stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackItem {
    pub id: u32,
    pub kind: StackItemKind,
    pub controller: PlayerId,
    pub context: SpellContext,
}

impl StackItem {
    #[must_use]
    pub fn is_spell(&self) -> bool {
        matches!(self.kind, StackItemKind::Spell { .. })
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, StackItemKind::Trigger { .. })
    }
}

/// LIFO stack of pending items.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StackEngine {
    items: Vec<StackItem>,
    next_id: u32,
}

impl StackEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an item and return its id.
    pub fn push(
        &mut self,
        kind: StackItemKind,
        controller: PlayerId,
        context: SpellContext,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(StackItem {
            id,
            kind,
            controller,
            context,
        });
        id
    }

    /// Pop the top item.
    pub fn pop(&mut self) -> Option<StackItem> {
        self.items.pop()
    }

    #[must_use]
    pub fn top(&self) -> Option<&StackItem> {
        self.items.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items bottom to top.
    #[must_use]
    pub fn items(&self) -> &[StackItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&StackItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut StackItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Remove an item by id (countered/stifled).
    pub fn remove(&mut self, id: u32) -> Option<StackItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    /// True while any item on the stack carries split second.
    #[must_use]
    pub fn split_second_active(&self) -> bool {
        self.items.iter().any(|i| i.context.split_second)
    }

    /// Copy an item, marking the copy and flagging its targets as
    /// re-choosable. Returns the copy's id.
    pub fn copy_item(&mut self, id: u32) -> Option<u32> {
        let original = self.get(id)?.clone();
        let mut context = original.context.clone();
        context.is_copy = true;
        context.needs_new_targets = true;
        Some(self.push(original.kind, original.controller, context))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spell_kind(id: u32) -> StackItemKind {
        StackItemKind::Spell {
            card: CardHandle::new(id, 0),
            card_id: CardId::new(id),
        }
    }

    #[test]
    fn test_lifo() {
        let mut stack = StackEngine::new();
        let first = stack.push(spell_kind(1), PlayerId::P1, SpellContext::default());
        let second = stack.push(spell_kind(2), PlayerId::P2, SpellContext::default());

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().unwrap().id, second);
        assert_eq!(stack.pop().unwrap().id, first);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_remove_by_id() {
        let mut stack = StackEngine::new();
        let a = stack.push(spell_kind(1), PlayerId::P1, SpellContext::default());
        let b = stack.push(spell_kind(2), PlayerId::P2, SpellContext::default());

        assert!(stack.remove(a).is_some());
        assert!(stack.remove(a).is_none());
        assert_eq!(stack.top().unwrap().id, b);
    }

    #[test]
    fn test_split_second_gate() {
        let mut stack = StackEngine::new();
        assert!(!stack.split_second_active());

        let mut context = SpellContext::default();
        context.split_second = true;
        stack.push(spell_kind(1), PlayerId::P1, context);

        assert!(stack.split_second_active());
    }

    #[test]
    fn test_copy_marks_context() {
        let mut stack = StackEngine::new();
        let mut context = SpellContext::default();
        context.targets.push(TargetRef::Player(PlayerId::P2));
        let original = stack.push(spell_kind(1), PlayerId::P1, context);

        let copy_id = stack.copy_item(original).unwrap();
        let copy = stack.get(copy_id).unwrap();

        assert!(copy.context.is_copy);
        assert!(copy.context.needs_new_targets);
        assert_eq!(copy.context.targets.len(), 1);
        assert!(!stack.get(original).unwrap().context.is_copy);
    }

    #[test]
    fn test_flashback_resolution_zone() {
        assert_eq!(
            CastMethod::Flashback.post_resolution_zone(),
            Some(Zone::Exile)
        );
        assert_eq!(CastMethod::Normal.post_resolution_zone(), None);
        assert!(CastMethod::Escape.casts_from_graveyard());
        assert!(!CastMethod::Madness.casts_from_graveyard());
    }
}
