//! Turn phases, combat steps, and choice sub-phases.
//!
//! The fixed turn order lives in `Phase::next_in_turn`; the phase machine
//! decides when a transition is legal. `Priority`, `Targeting`,
//! `Sacrifice`, and `Choose` are sub-phases: the game parks the turn
//! phase, enters the sub-phase for the duration of the protocol, and
//! restores the parked phase afterwards.

use serde::{Deserialize, Serialize};

/// A turn phase, combat step, or transient sub-phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Untap,
    Upkeep,
    Draw,
    MainPre,
    BeginCombat,
    DeclareAttackers,
    DeclareBlockers,
    FirstStrikeDamage,
    CombatDamage,
    EndOfCombat,
    MainPost,
    EndStep,
    Cleanup,
    /// Waiting on responses while the stack is non-empty.
    Priority,
    /// Choosing targets for a pending stack item.
    Targeting,
    /// Choosing permanents to sacrifice.
    Sacrifice,
    /// Modal / X / colour / scry / surveil decisions.
    Choose,
}

impl Phase {
    /// True for phases that are part of the fixed turn sequence, as
    /// opposed to transient sub-phases.
    #[must_use]
    pub fn is_turn_phase(self) -> bool {
        !matches!(
            self,
            Phase::Priority | Phase::Targeting | Phase::Sacrifice | Phase::Choose
        )
    }

    /// True when players normally receive priority in this phase.
    #[must_use]
    pub fn is_interactive(self) -> bool {
        !matches!(self, Phase::Untap | Phase::Cleanup)
    }

    /// True for the two main phases.
    #[must_use]
    pub fn is_main(self) -> bool {
        matches!(self, Phase::MainPre | Phase::MainPost)
    }

    /// True for the declare/damage steps of combat.
    #[must_use]
    pub fn is_combat(self) -> bool {
        matches!(
            self,
            Phase::BeginCombat
                | Phase::DeclareAttackers
                | Phase::DeclareBlockers
                | Phase::FirstStrikeDamage
                | Phase::CombatDamage
                | Phase::EndOfCombat
        )
    }

    /// True for the transient choice sub-phases.
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, Phase::Targeting | Phase::Sacrifice | Phase::Choose)
    }

    /// The next phase in the turn sequence.
    ///
    /// `first_strike` selects whether the first-strike damage step is
    /// taken; `combatants` whether any attackers were declared (combat
    /// collapses straight to end of combat otherwise). Returns `None`
    /// from `Cleanup` (the turn rollover is the phase machine's job)
    /// and for sub-phases, which are not part of the sequence.
    #[must_use]
    pub fn next_in_turn(self, first_strike: bool, combatants: bool) -> Option<Phase> {
        Some(match self {
            Phase::Untap => Phase::Upkeep,
            Phase::Upkeep => Phase::Draw,
            Phase::Draw => Phase::MainPre,
            Phase::MainPre => Phase::BeginCombat,
            Phase::BeginCombat => Phase::DeclareAttackers,
            Phase::DeclareAttackers => {
                if combatants {
                    Phase::DeclareBlockers
                } else {
                    Phase::EndOfCombat
                }
            }
            Phase::DeclareBlockers => {
                if first_strike {
                    Phase::FirstStrikeDamage
                } else {
                    Phase::CombatDamage
                }
            }
            Phase::FirstStrikeDamage => Phase::CombatDamage,
            Phase::CombatDamage => Phase::EndOfCombat,
            Phase::EndOfCombat => Phase::MainPost,
            Phase::MainPost => Phase::EndStep,
            Phase::EndStep => Phase::Cleanup,
            Phase::Cleanup => return None,
            Phase::Priority | Phase::Targeting | Phase::Sacrifice | Phase::Choose => return None,
        })
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_sequence_without_combatants() {
        // Declare attackers with nobody attacking skips the damage steps.
        assert_eq!(
            Phase::DeclareAttackers.next_in_turn(false, false),
            Some(Phase::EndOfCombat)
        );
    }

    #[test]
    fn test_first_strike_step_selection() {
        assert_eq!(
            Phase::DeclareBlockers.next_in_turn(true, true),
            Some(Phase::FirstStrikeDamage)
        );
        assert_eq!(
            Phase::DeclareBlockers.next_in_turn(false, true),
            Some(Phase::CombatDamage)
        );
    }

    #[test]
    fn test_full_turn_walk() {
        let mut phase = Phase::Untap;
        let mut seen = vec![phase];
        while let Some(next) = phase.next_in_turn(false, true) {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(phase, Phase::Cleanup);
        assert_eq!(seen.len(), 12); // all turn phases minus first strike
    }

    #[test]
    fn test_sub_phases_not_in_sequence() {
        assert_eq!(Phase::Targeting.next_in_turn(false, false), None);
        assert!(!Phase::Priority.is_turn_phase());
        assert!(Phase::Sacrifice.is_choice());
    }

    #[test]
    fn test_interactivity() {
        assert!(!Phase::Untap.is_interactive());
        assert!(!Phase::Cleanup.is_interactive());
        assert!(Phase::Upkeep.is_interactive());
        assert!(Phase::CombatDamage.is_interactive());
    }
}
