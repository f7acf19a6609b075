//! Positive (discomfort) factor evaluation for the audio signal.
//!
//! Each factor is weight × magnitude, clamped to its cap, and a missing
//! input simply contributes zero. The breakdown is kept per factor so
//! downstream tooling can show what is driving the signal.

use serde::Serialize;
use veil_core::config::{BiomeConfig, SdiConfig};
use veil_memory::{PatternMemory, SilenceTracker, SoundMemory};

/// Per-factor breakdown of one discomfort evaluation. All fields >= 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiscomfortResult {
    pub total: f32,
    pub density_overload: f32,
    pub layer_conflict: f32,
    pub rhythm_instability: f32,
    pub silence_deprivation: f32,
    pub persistence: f32,
    pub absence_after_pattern: f32,
}

/// Evaluates the discomfort factor catalogue against the memory layer.
#[derive(Debug, Clone)]
pub struct DiscomfortCalculator {
    cfg: SdiConfig,
    biome: BiomeConfig,
}

impl DiscomfortCalculator {
    pub fn new(cfg: SdiConfig, biome: BiomeConfig) -> Self {
        Self { cfg, biome }
    }

    pub fn calculate(
        &self,
        memory: &SoundMemory,
        silence: &SilenceTracker,
        patterns: &mut PatternMemory,
        now: f64,
    ) -> DiscomfortResult {
        let mut r = DiscomfortResult {
            density_overload: self.density_overload(memory),
            layer_conflict: self.layer_conflict(memory),
            rhythm_instability: self.rhythm_instability(patterns),
            silence_deprivation: self.silence_deprivation(silence, now),
            persistence: self.persistence(memory, now),
            absence_after_pattern: self.absence_after_pattern(patterns, now),
            total: 0.0,
        };
        r.total = r.density_overload
            + r.layer_conflict
            + r.rhythm_instability
            + r.silence_deprivation
            + r.persistence
            + r.absence_after_pattern;
        r
    }

    /// Layers running past their capacity: weight per excess sound.
    fn density_overload(&self, memory: &SoundMemory) -> f32 {
        let capacity = self.biome.layer_capacity;
        let w = self.cfg.discomfort_weights.density_overload;
        let mut total = 0.0;
        for (_, count) in memory.layer_counts() {
            if count > capacity {
                total += w * (count - capacity) as f32;
            }
        }
        total.min(self.cfg.discomfort_caps.density_overload)
    }

    /// Configured conflicting sound pairs simultaneously active; tag
    /// conflicts count weaker than explicit pairs.
    fn layer_conflict(&self, memory: &SoundMemory) -> f32 {
        let w = self.cfg.discomfort_weights.layer_conflict;
        let mut total = 0.0;
        for pair in &self.cfg.conflict_pairs {
            if memory.check_sound_pair_active(&pair.sound_a, &pair.sound_b) {
                total += w * pair.strength.multiplier();
            }
        }
        for pair in &self.cfg.tag_conflicts {
            if !memory.active_with_tag_pair(&pair.tag_a, &pair.tag_b).is_empty() {
                total += w * pair.strength.multiplier() * 0.7;
            }
        }
        total.min(self.cfg.discomfort_caps.layer_conflict)
    }

    /// Drifting patterns, amplified by how far they drift.
    fn rhythm_instability(&self, patterns: &PatternMemory) -> f32 {
        let w = self.cfg.discomfort_weights.rhythm_instability;
        let mut total = 0.0;
        for p in patterns.by_type(veil_memory::PatternType::Drifting) {
            let drift_mult = 1.0 + (p.drift_amount() as f32).min(0.5);
            total += w * drift_mult;
        }
        total.min(self.cfg.discomfort_caps.rhythm_instability)
    }

    /// Too long without a silence gap.
    fn silence_deprivation(&self, silence: &SilenceTracker, now: f64) -> f32 {
        let factor = silence.deprivation_factor(now, self.biome.silence_tolerance) as f32;
        let w = self.cfg.discomfort_weights.silence_deprivation;
        (w * factor).min(self.cfg.discomfort_caps.silence_deprivation)
    }

    /// Sounds that overstayed their natural duration: weight per 10s of
    /// overstay, summed over active events.
    fn persistence(&self, memory: &SoundMemory, now: f64) -> f32 {
        let w = self.cfg.discomfort_weights.persistence;
        let mut total = 0.0;
        for event in memory.active_events() {
            let overstay = event.overstay(now) as f32;
            if overstay > 0.0 {
                total += w * (overstay / 10.0);
            }
        }
        total.min(self.cfg.discomfort_caps.persistence)
    }

    /// Recently broken patterns, fading as the break ages.
    fn absence_after_pattern(&self, patterns: &mut PatternMemory, now: f64) -> f32 {
        let w = self.cfg.discomfort_weights.absence_after_pattern;
        let contributions = patterns.break_contributions(now, self.cfg.break_decay_time);
        let total: f32 = contributions.iter().map(|(_, c)| w * *c as f32).sum();
        total.min(self.cfg.discomfort_caps.absence_after_pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::config::{PairStrength, SoundPair};
    use veil_memory::{EndType, SoundEvent};

    fn calc() -> DiscomfortCalculator {
        DiscomfortCalculator::new(SdiConfig::default(), BiomeConfig::default())
    }

    fn event(id: u64, sound: &str, t: f64, layer: &str) -> SoundEvent {
        SoundEvent::new(id, sound, t, 0.0, 0.8, layer, "mid")
    }

    #[test]
    fn test_empty_memory_is_zero() {
        let memory = SoundMemory::default();
        let mut silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        // Leave silence so deprivation can apply, but stay within tolerance
        silence.update(0.0, 1);
        let r = calc().calculate(&memory, &silence, &mut patterns, 1.0);
        assert_eq!(r.total, 0.0);
    }

    #[test]
    fn test_density_overload_counts_excess() {
        let mut memory = SoundMemory::default();
        // 6 active on one layer, capacity 4: excess 2
        for i in 0..6u64 {
            memory.add_event(event(i, "bird", 0.0, "fauna"));
        }
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        let r = calc().calculate(&memory, &silence, &mut patterns, 1.0);
        assert!((r.density_overload - 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_density_overload_capped() {
        let mut memory = SoundMemory::default();
        for i in 0..20u64 {
            memory.add_event(event(i, "bird", 0.0, "fauna"));
        }
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        let r = calc().calculate(&memory, &silence, &mut patterns, 1.0);
        assert_eq!(r.density_overload, 0.45);
    }

    #[test]
    fn test_layer_conflict_pairs() {
        let mut cfg = SdiConfig::default();
        cfg.conflict_pairs.push(SoundPair {
            sound_a: "thunder".into(),
            sound_b: "birdsong".into(),
            strength: PairStrength::Strong,
        });
        let calc = DiscomfortCalculator::new(cfg, BiomeConfig::default());

        let mut memory = SoundMemory::default();
        memory.add_event(event(1, "thunder", 0.0, "weather"));
        memory.add_event(event(2, "birdsong", 0.0, "fauna"));
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        let r = calc.calculate(&memory, &silence, &mut patterns, 1.0);
        assert!((r.layer_conflict - 0.25 * 1.5).abs() < 1e-6);

        // Ending one side removes the conflict
        memory.end_event(2, 2.0, EndType::Natural);
        let r = calc.calculate(&memory, &silence, &mut patterns, 2.0);
        assert_eq!(r.layer_conflict, 0.0);
    }

    #[test]
    fn test_silence_deprivation_grows() {
        let memory = SoundMemory::default();
        let mut silence = SilenceTracker::default();
        silence.update(0.0, 1); // leave silence at t=0, tolerance 5s
        let mut patterns = PatternMemory::default();
        let c = calc();

        let within = c.calculate(&memory, &silence, &mut patterns, 4.0);
        assert_eq!(within.silence_deprivation, 0.0);

        let deprived = c.calculate(&memory, &silence, &mut patterns, 15.0);
        // factor = (15-5)/5 = 2.0; 0.08 * 2.0 = 0.16
        assert!((deprived.silence_deprivation - 0.16).abs() < 1e-6);

        // Far past tolerance the cap holds
        let capped = c.calculate(&memory, &silence, &mut patterns, 500.0);
        assert_eq!(capped.silence_deprivation, 0.40);
    }

    #[test]
    fn test_persistence_from_overstay() {
        let mut memory = SoundMemory::default();
        let mut e = event(1, "drone", 0.0, "ambient");
        e.duration = 10.0;
        memory.add_event(e);
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        // Overstay beyond 15s: at t=35, overstay = 20s -> 0.05 * 2.0
        let r = calc().calculate(&memory, &silence, &mut patterns, 35.0);
        assert!((r.persistence - 0.10).abs() < 1e-6);
    }

    #[test]
    fn test_absence_after_pattern_decays() {
        let memory = SoundMemory::default();
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        for t in [0.0, 2.0, 4.0, 6.0] {
            patterns.record_occurrence("drip", t);
        }
        patterns.check_all_breaks(13.0); // break stamped at 12.0
        let c = calc();

        let fresh = c.calculate(&memory, &silence, &mut patterns, 12.0);
        assert!((fresh.absence_after_pattern - 0.15).abs() < 1e-6);

        // Half decayed at 15s into the 30s decay window
        let half = c.calculate(&memory, &silence, &mut patterns, 27.0);
        assert!((half.absence_after_pattern - 0.075).abs() < 1e-6);

        let gone = c.calculate(&memory, &silence, &mut patterns, 60.0);
        assert_eq!(gone.absence_after_pattern, 0.0);
    }
}
