pub mod pattern;
pub mod silence;
pub mod sound;

pub use pattern::{PatternMemory, PatternState, PatternType};
pub use silence::{SilenceGap, SilenceTracker};
pub use sound::{EndType, SoundEvent, SoundMemory};
