//! Server-side entity definitions.

mod creature;
mod player;

pub use creature::CreatureInstance;
pub use player::PlayerCombatant;
