//! Decaying cross-region attraction signals.
//!
//! A signal is a directional nudge from an overcrowded region toward a
//! calmer one. It contributes `strength × time_remaining / duration` to
//! the target's receiving total, so a signal fades linearly over its
//! lifetime. The field is advisory output only; nothing here moves
//! population.

use serde::Serialize;

use crate::coordinator::RegionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttractionSignal {
    pub source: RegionHandle,
    pub target: RegionHandle,
    pub strength: f32,
    pub time_remaining: f64,
}

/// Bounded collection of live signals with in-place decay-and-compact.
#[derive(Debug)]
pub struct AttractionField {
    signals: Vec<AttractionSignal>,
    duration: f64,
    max_signals: usize,
}

impl AttractionField {
    pub fn new(duration: f64, max_signals: usize) -> Self {
        Self {
            signals: Vec::new(),
            duration: duration.max(f64::EPSILON),
            max_signals: max_signals.max(1),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signals(&self) -> &[AttractionSignal] {
        &self.signals
    }

    /// Emit a fresh signal with full lifetime. Dropped when the field is
    /// at capacity.
    pub fn emit(&mut self, source: RegionHandle, target: RegionHandle, strength: f32) {
        if self.signals.len() >= self.max_signals {
            tracing::warn!("Attraction field at capacity, signal dropped");
            return;
        }
        self.signals.push(AttractionSignal {
            source,
            target,
            strength,
            time_remaining: self.duration,
        });
    }

    /// Age every signal by `dt` and compact out the expired ones.
    pub fn decay(&mut self, dt: f64) {
        for s in &mut self.signals {
            s.time_remaining -= dt;
        }
        self.signals.retain(|s| s.time_remaining > 0.0);
    }

    /// True if a live signal already runs source→target.
    pub fn has_live(&self, source: RegionHandle, target: RegionHandle) -> bool {
        self.signals
            .iter()
            .any(|s| s.source == source && s.target == target)
    }

    /// Total attraction arriving at a region right now.
    pub fn receiving(&self, target: RegionHandle) -> f32 {
        self.signals
            .iter()
            .filter(|s| s.target == target)
            .map(|s| s.strength * (s.time_remaining / self.duration) as f32)
            .sum()
    }

    /// Drop every signal originating from a region.
    pub fn clear_source(&mut self, source: RegionHandle) {
        self.signals.retain(|s| s.source != source);
    }

    /// Drop every signal touching a region, as source or target (used on
    /// region reset).
    pub fn clear_involving(&mut self, region: RegionHandle) {
        self.signals
            .retain(|s| s.source != region && s.target != region);
    }

    pub fn clear(&mut self) {
        self.signals.clear();
    }
}
