//! Game state: players, zones, the card lifecycle, SBAs, and reward
//! shaping scalars.

mod events;
#[allow(clippy::module_inception)]
mod game;
mod player_state;
mod reward;
mod sba;
mod store;

pub use events::{GameEvent, PendingTrigger};
pub use game::{
    EffectGrant, Game, GameConfig, GameOutcome, MoveError, TokenKind, ZonePlacement,
};
pub use player_state::PlayerState;
pub use reward::{RewardWeights, StateSnapshot};
pub use store::CardStore;
