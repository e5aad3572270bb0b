//! Core value types: seats, handles, mana, phases, RNG.

mod handle;
mod mana;
mod phase;
mod player;
mod rng;
mod zone;

pub use handle::CardHandle;
pub use mana::{Color, ManaCost, ManaPool};
pub use phase::Phase;
pub use player::{PlayerId, PlayerPair};
pub use rng::{GameRng, GameRngState};
pub use zone::Zone;
