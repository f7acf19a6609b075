//! Target computation and asymmetric smoothing for one signal.
//!
//! The target blends the population curve with a fraction of the raw
//! factor sum, then the smoothed value converges toward it with a rise
//! rate and a strictly slower fall rate. Escalation is quick; recovery
//! drags. Both rates are fractions of the remaining gap per second.

use serde::{Deserialize, Serialize};
use veil_core::config::SignalConfig;
use veil_core::math::sanitize_f32;
use veil_core::Trend;

/// One tick's output for a single signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    pub raw: f32,
    pub target: f32,
    pub smoothed: f32,
    pub delta: f32,
    pub trend: Trend,
}

impl Default for SignalFrame {
    fn default() -> Self {
        Self {
            raw: 0.0,
            target: 0.0,
            smoothed: 0.0,
            delta: 0.0,
            trend: Trend::Stable,
        }
    }
}

/// Smoothing state for one signal.
#[derive(Debug, Clone)]
pub struct SignalCalculator {
    cfg: SignalConfig,
    smoothed: f32,
    initialized: bool,
}

impl SignalCalculator {
    pub fn new(cfg: SignalConfig) -> Self {
        Self {
            cfg,
            smoothed: 0.0,
            initialized: false,
        }
    }

    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Advance the smoothed value toward the target derived from `raw`
    /// and `population`, over `dt` seconds.
    pub fn advance(&mut self, raw: f32, population: f32, dt: f64) -> SignalFrame {
        let raw = sanitize_f32(raw, 0.0).clamp(self.cfg.floor, self.cfg.operational_max);
        let population = sanitize_f32(population, 0.0).clamp(0.0, 1.0);

        let base = self.cfg.population_curve.sample(population);
        let target = (base + raw * self.cfg.feedback_gain)
            .clamp(self.cfg.floor, self.cfg.operational_max);

        if !self.initialized {
            // Cold start: no delta to smooth yet
            self.smoothed = target;
            self.initialized = true;
            return SignalFrame {
                raw,
                target,
                smoothed: target,
                delta: 0.0,
                trend: Trend::Stable,
            };
        }

        let previous = self.smoothed;
        let rate = if target > previous {
            self.cfg.rise_rate
        } else {
            self.cfg.fall_rate
        };
        let alpha = ((rate as f64 * dt).min(1.0)) as f32;
        self.smoothed = previous + (target - previous) * alpha;
        self.smoothed = sanitize_f32(self.smoothed, previous)
            .clamp(self.cfg.floor, self.cfg.operational_max);

        let delta = self.smoothed - previous;
        let trend = if delta > self.cfg.delta_band {
            Trend::Rising
        } else if delta < -self.cfg.delta_band {
            Trend::Falling
        } else {
            Trend::Stable
        };

        SignalFrame {
            raw,
            target,
            smoothed: self.smoothed,
            delta,
            trend,
        }
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
        self.initialized = false;
    }
}
