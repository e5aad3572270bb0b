//! The dispatcher's error taxonomy.
//!
//! Nothing here crosses the environment boundary as an `Err`: every
//! variant is converted into a penalty reward and, where useful, an
//! `error_message` entry in the step info.

use thiserror::Error;

/// Why an action was rejected or failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action index {0} is outside the vocabulary")]
    OutOfRange(u16),

    #[error("mask bit for action {0} is not set")]
    MaskMiss(u16),

    #[error("context is missing required field '{field}'")]
    InvalidContext { field: &'static str },

    #[error("cost could not be paid")]
    CostPaymentFailed,

    #[error("stack item could not resolve")]
    ResolutionFailed,

    #[error("no legal progress for {0} consecutive decisions")]
    StuckState(u32),

    #[error("handler panicked; state restored from snapshot")]
    CriticalError,
}

impl ActionError {
    /// Whether the error leaves the game state untouched.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ActionError::OutOfRange(_)
                | ActionError::MaskMiss(_)
                | ActionError::InvalidContext { .. }
                | ActionError::CostPaymentFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_leave_state() {
        assert!(ActionError::OutOfRange(700).is_rejection());
        assert!(ActionError::MaskMiss(3).is_rejection());
        assert!(!ActionError::CriticalError.is_rejection());
    }

    #[test]
    fn test_display() {
        let err = ActionError::InvalidContext { field: "hand_idx" };
        assert_eq!(
            err.to_string(),
            "context is missing required field 'hand_idx'"
        );
    }
}
