//! Static card data and per-instance card state.

mod card;
mod instance;
mod keywords;
mod registry;
mod types;

pub use card::{AbilityData, CardData, CardFace, CardId, CardLayout, ManaProduce};
pub use instance::{CardInstance, CounterKind};
pub use keywords::{keyword_set, Keyword, KeywordSet};
pub use registry::CardRegistry;
pub use types::{CardType, SacrificeFilter, Supertype, TypeLine};
