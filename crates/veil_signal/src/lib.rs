pub mod audio;
pub mod calculator;
pub mod comfort;
pub mod discomfort;
pub mod visual;

pub use audio::AudioChannel;
pub use calculator::{SignalCalculator, SignalFrame};
pub use comfort::{ComfortCalculator, ComfortResult};
pub use discomfort::{DiscomfortCalculator, DiscomfortResult};
pub use visual::VisualChannel;
