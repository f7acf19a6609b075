//! The visual channel: wear, wildlife and motion proxies plus VDI
//! computation.
//!
//! Visual discomfort has no event memory; it integrates three slow
//! proxies of crowding. Wear builds while a region stays busy and
//! recovers slowly when it empties. Wildlife flees quickly above a
//! population threshold and returns much more slowly below it, so the
//! visible emptiness of a crowded region outlasts the crowd. Motion
//! sync tracks how uniformly foliage and props animate: crowding
//! desynchronizes them, which reads as subtle unease long before the
//! crowd itself registers.

use veil_core::config::{SignalConfig, VdiConfig};
use veil_core::{DiscomfortSource, VeilConfig};

use crate::calculator::{SignalCalculator, SignalFrame};

pub struct VisualChannel {
    cfg: VdiConfig,
    calculator: SignalCalculator,
    /// Accumulated environmental wear, [0, 1].
    wear: f32,
    /// Wildlife visibility, [0, 1]; 1.0 = fully present.
    wildlife: f32,
    /// Motion synchronization, [0, 1]; 1.0 = fully coherent.
    motion_sync: f32,
    last_frame: SignalFrame,
}

impl VisualChannel {
    pub fn new(cfg: &VeilConfig) -> Self {
        Self::with_configs(cfg.vdi.clone(), cfg.signal.clone())
    }

    pub fn with_configs(cfg: VdiConfig, signal: SignalConfig) -> Self {
        Self {
            cfg,
            calculator: SignalCalculator::new(signal),
            wear: 0.0,
            wildlife: 1.0,
            motion_sync: 1.0,
            last_frame: SignalFrame::default(),
        }
    }

    pub fn wear(&self) -> f32 {
        self.wear
    }

    pub fn wildlife_visibility(&self) -> f32 {
        self.wildlife
    }

    pub fn motion_sync(&self) -> f32 {
        self.motion_sync
    }

    pub fn last_frame(&self) -> SignalFrame {
        self.last_frame
    }

    fn integrate_proxies(&mut self, population: f32, dt: f64) {
        let dt = dt as f32;
        if population > self.cfg.wear_threshold {
            self.wear += self.cfg.wear_build_rate * (population - self.cfg.wear_threshold) * dt;
        } else {
            self.wear -= self.cfg.wear_decay_rate * dt;
        }
        self.wear = self.wear.clamp(0.0, 1.0);

        if population > self.cfg.wildlife_threshold {
            // Flee fast
            self.wildlife -= self.cfg.wildlife_flee_rate * dt;
        } else {
            // Return slow
            self.wildlife += self.cfg.wildlife_return_rate * dt;
        }
        self.wildlife = self.wildlife.clamp(0.0, 1.0);

        // Sync degrades linearly with crowding past the threshold and
        // the proxy chases that level slowly in both directions
        let target_sync = if population <= self.cfg.motion_threshold {
            1.0
        } else {
            let span = (1.0 - self.cfg.motion_threshold).max(1e-6);
            1.0 - (population - self.cfg.motion_threshold) / span
        };
        let alpha = (self.cfg.motion_smoothing * dt).min(1.0);
        self.motion_sync += (target_sync - self.motion_sync) * alpha;
        self.motion_sync = self.motion_sync.clamp(0.0, 1.0);
    }
}

impl DiscomfortSource for VisualChannel {
    fn advance(&mut self, population: f32, now: f64, dt: f64) -> f32 {
        let _ = now;
        let population = population.clamp(0.0, 1.0);
        self.integrate_proxies(population, dt);

        let discomfort = self.cfg.visual_density * population
            + self.cfg.environmental_wear * self.wear
            + self.cfg.wildlife_absence * (1.0 - self.wildlife)
            + self.cfg.motion_incoherence * (1.0 - self.motion_sync);
        let comfort = self.cfg.wildlife_presence * self.wildlife
            + self.cfg.visual_clarity * (1.0 - self.wear)
            + self.cfg.motion_coherence * self.motion_sync;

        let raw = discomfort + comfort;
        self.last_frame = self.calculator.advance(raw, population, dt);
        self.last_frame.smoothed
    }

    fn reset(&mut self) {
        self.wear = 0.0;
        self.wildlife = 1.0;
        self.motion_sync = 1.0;
        self.calculator.reset();
        self.last_frame = SignalFrame::default();
    }
}
