//! The 480-bit action mask and its reason map.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::context::ActionContext;
use super::vocab::ACTION_SPACE;

const WORDS: usize = ACTION_SPACE.div_ceil(64);

/// Why a bit is set and what the dispatcher will need with it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskEntry {
    pub reason: String,
    /// Shape of the context the action expects (defaults filled in
    /// where the index carries everything).
    pub context: ActionContext,
}

/// Fixed-width legality bitmap plus a parallel reason map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMask {
    bits: [u64; WORDS],
    reasons: FxHashMap<u16, MaskEntry>,
}

impl ActionMask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a bit with its reason.
    pub fn allow(&mut self, index: u16, reason: impl Into<String>) {
        self.allow_with(index, reason, ActionContext::None);
    }

    /// Set a bit with a reason and required-context descriptor.
    pub fn allow_with(&mut self, index: u16, reason: impl Into<String>, context: ActionContext) {
        let i = index as usize;
        if i >= ACTION_SPACE {
            return;
        }
        self.bits[i / 64] |= 1 << (i % 64);
        self.reasons.insert(
            index,
            MaskEntry {
                reason: reason.into(),
                context,
            },
        );
    }

    /// Whether an action is currently legal.
    #[must_use]
    pub fn allowed(&self, index: u16) -> bool {
        let i = index as usize;
        i < ACTION_SPACE && self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    /// The reason entry for a set bit.
    #[must_use]
    pub fn entry(&self, index: u16) -> Option<&MaskEntry> {
        self.reasons.get(&index)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Indices of set bits, ascending.
    pub fn set_indices(&self) -> impl Iterator<Item = u16> + '_ {
        (0..ACTION_SPACE as u16).filter(|&i| self.allowed(i))
    }

    /// The mask as a plain boolean vector (agent-facing layout).
    #[must_use]
    pub fn to_vec(&self) -> Vec<bool> {
        (0..ACTION_SPACE as u16).map(|i| self.allowed(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_and_query() {
        let mut mask = ActionMask::new();
        mask.allow(11, "pass priority");
        mask.allow(479, "edge");

        assert!(mask.allowed(11));
        assert!(mask.allowed(479));
        assert!(!mask.allowed(12));
        assert!(!mask.allowed(480));
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.entry(11).unwrap().reason, "pass priority");
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut mask = ActionMask::new();
        mask.allow(500, "nope");
        assert!(mask.is_empty());
    }

    #[test]
    fn test_set_indices_sorted() {
        let mut mask = ActionMask::new();
        mask.allow(300, "b");
        mask.allow(4, "a");

        let indices: Vec<u16> = mask.set_indices().collect();
        assert_eq!(indices, vec![4, 300]);
    }

    #[test]
    fn test_to_vec_length() {
        let mask = ActionMask::new();
        assert_eq!(mask.to_vec().len(), ACTION_SPACE);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut mask = ActionMask::new();
        mask.allow_with(
            20,
            "cast",
            ActionContext::Hand { hand_idx: 0 },
        );
        let bytes = bincode::serialize(&mask).unwrap();
        let back: ActionMask = bincode::deserialize(&bytes).unwrap();
        assert_eq!(mask, back);
    }
}
