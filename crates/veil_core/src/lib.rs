pub mod config;
pub mod curve;
pub mod math;

pub use config::VeilConfig;
pub use curve::PopulationCurve;

use serde::{Deserialize, Serialize};

/// Direction of change of a smoothed signal, classified with a dead band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

/// A source of one discomfort signal (audio or visual) for a region.
///
/// Implementations own whatever internal state they need (event memories,
/// wear accumulators, smoothing state) and advance it by `dt` seconds each
/// call, returning the current raw signal value. The coordinator treats
/// the return value as opaque input; it applies its own history, spike and
/// anti-sync logic on top.
pub trait DiscomfortSource: Send + Sync {
    /// Advance internal state to `now` and return the raw signal value.
    ///
    /// `population` is the region's population ratio in [0, 1] (callers
    /// clamp before invoking). `dt` is the seconds elapsed since the
    /// previous call, always positive and finite.
    fn advance(&mut self, population: f32, now: f64, dt: f64) -> f32;

    /// Reset internal state to its initial condition.
    fn reset(&mut self);
}

/// Shared-ownership sources: the coordinator drives the channel while
/// the game keeps a handle to feed events into it.
impl<T: DiscomfortSource> DiscomfortSource for std::sync::Arc<std::sync::Mutex<T>> {
    fn advance(&mut self, population: f32, now: f64, dt: f64) -> f32 {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.advance(population, now, dt)
    }

    fn reset(&mut self) {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.reset();
    }
}
