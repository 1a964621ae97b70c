pub mod creatures;
pub mod leveling;
pub mod protocol;
pub mod rewards;
pub mod stats;

pub use creatures::*;
pub use leveling::*;
pub use protocol::*;
pub use rewards::*;
pub use stats::*;
