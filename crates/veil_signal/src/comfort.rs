//! Negative (comfort) factor evaluation for the audio signal.
//!
//! All contributions are zero or negative, clamped at per-factor floors.
//! Transition and resolution counts come from the playback layer, which
//! is the only place that knows about crossfades and tension arcs.

use serde::Serialize;
use std::collections::BTreeSet;
use veil_core::config::{BiomeConfig, SdiConfig};
use veil_memory::{PatternMemory, PatternType, SilenceTracker, SoundMemory};

/// Per-factor breakdown of one comfort evaluation. All fields <= 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComfortResult {
    pub total: f32,
    pub predictable_rhythm: f32,
    pub appropriate_silence: f32,
    pub layer_harmony: f32,
    pub gradual_transition: f32,
    pub resolution: f32,
    pub environmental_coherence: f32,
}

#[derive(Debug, Clone)]
pub struct ComfortCalculator {
    cfg: SdiConfig,
    biome: BiomeConfig,
}

impl ComfortCalculator {
    pub fn new(cfg: SdiConfig, biome: BiomeConfig) -> Self {
        Self { cfg, biome }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &self,
        memory: &SoundMemory,
        silence: &SilenceTracker,
        patterns: &PatternMemory,
        now: f64,
        recent_transitions: usize,
        recent_resolutions: usize,
    ) -> ComfortResult {
        let mut r = ComfortResult {
            predictable_rhythm: self.predictable_rhythm(patterns),
            appropriate_silence: self.appropriate_silence(silence, now),
            layer_harmony: self.layer_harmony(memory),
            gradual_transition: self.gradual_transition(recent_transitions),
            resolution: self.resolution(recent_resolutions),
            environmental_coherence: self.environmental_coherence(memory),
            total: 0.0,
        };
        r.total = r.predictable_rhythm
            + r.appropriate_silence
            + r.layer_harmony
            + r.gradual_transition
            + r.resolution
            + r.environmental_coherence;
        r
    }

    /// Stable rhythmic patterns; the tightest ones earn a bonus.
    fn predictable_rhythm(&self, patterns: &PatternMemory) -> f32 {
        let w = self.cfg.comfort_weights.predictable_rhythm;
        let mut total = 0.0;
        for p in patterns.by_type(PatternType::Rhythmic) {
            let stability_bonus = if p.cv < 0.05 {
                1.3
            } else if p.cv < 0.08 {
                1.15
            } else {
                1.0
            };
            total += w * stability_bonus;
        }
        total.max(self.cfg.comfort_floors.predictable_rhythm)
    }

    /// Well-timed silence gaps in the recent window.
    fn appropriate_silence(&self, silence: &SilenceTracker, now: f64) -> f32 {
        let count = silence.count_appropriate_recent(self.cfg.silence_comfort_window, now);
        if count == 0 {
            return 0.0;
        }
        let total = self.cfg.comfort_weights.appropriate_silence * count as f32;
        total.max(self.cfg.comfort_floors.appropriate_silence)
    }

    /// Complementary sounds playing together; tag harmonies count weaker
    /// than explicit pairs, and each pair counts once.
    fn layer_harmony(&self, memory: &SoundMemory) -> f32 {
        let w = self.cfg.comfort_weights.layer_harmony;
        let mut total = 0.0;
        let mut found: BTreeSet<(String, String)> = BTreeSet::new();

        for pair in &self.cfg.harmony_pairs {
            if memory.check_sound_pair_active(&pair.sound_a, &pair.sound_b) {
                let key = ordered(&pair.sound_a, &pair.sound_b);
                if found.insert(key) {
                    total += w * pair.strength.multiplier();
                }
            }
        }
        for pair in &self.cfg.tag_harmonies {
            if !memory.active_with_tag_pair(&pair.tag_a, &pair.tag_b).is_empty() {
                let key = ordered(&pair.tag_a, &pair.tag_b);
                if found.insert(key) {
                    total += w * pair.strength.multiplier() * 0.7;
                }
            }
        }
        total.max(self.cfg.comfort_floors.layer_harmony)
    }

    fn gradual_transition(&self, recent_transitions: usize) -> f32 {
        let total = self.cfg.comfort_weights.gradual_transition * recent_transitions as f32;
        total.max(self.cfg.comfort_floors.gradual_transition)
    }

    fn resolution(&self, recent_resolutions: usize) -> f32 {
        let total = self.cfg.comfort_weights.resolution * recent_resolutions as f32;
        total.max(self.cfg.comfort_floors.resolution)
    }

    /// Constant comfort while every active sound belongs to the biome
    /// pool. Silence is always coherent; an empty pool disables the
    /// check and reads as coherent.
    fn environmental_coherence(&self, memory: &SoundMemory) -> f32 {
        let w = self.cfg.comfort_weights.environmental_coherence;
        if self.biome.sound_pool.is_empty() {
            return w.max(self.cfg.comfort_floors.environmental_coherence);
        }
        for event in memory.active_events() {
            if !self.biome.sound_pool.iter().any(|s| s == &event.sound_id) {
                return 0.0;
            }
        }
        w.max(self.cfg.comfort_floors.environmental_coherence)
    }
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::config::{PairStrength, SoundPair, TagPair};
    use veil_memory::SoundEvent;

    fn calc_with(cfg: SdiConfig, biome: BiomeConfig) -> ComfortCalculator {
        ComfortCalculator::new(cfg, biome)
    }

    fn calc() -> ComfortCalculator {
        calc_with(SdiConfig::default(), BiomeConfig::default())
    }

    fn event(id: u64, sound: &str, layer: &str) -> SoundEvent {
        SoundEvent::new(id, sound, 0.0, 0.0, 0.8, layer, "mid")
    }

    #[test]
    fn test_all_contributions_non_positive() {
        let mut memory = SoundMemory::default();
        memory.add_event(event(1, "rain", "weather").with_tags(["water"]));
        let silence = SilenceTracker::default();
        let mut patterns = PatternMemory::default();
        for t in [0.0, 5.0, 10.0, 15.0] {
            patterns.record_occurrence("owl", t);
        }
        let r = calc().calculate(&memory, &silence, &patterns, 20.0, 2, 1);
        assert!(r.total <= 0.0);
        assert!(r.predictable_rhythm <= 0.0);
        assert!(r.gradual_transition <= 0.0);
        assert!(r.resolution <= 0.0);
    }

    #[test]
    fn test_predictable_rhythm_stability_bonus() {
        let mut patterns = PatternMemory::default();
        // Perfect rhythm: cv = 0 earns the 1.3x bonus
        for t in [0.0, 5.0, 10.0, 15.0] {
            patterns.record_occurrence("owl", t);
        }
        let memory = SoundMemory::default();
        let silence = SilenceTracker::default();
        let r = calc().calculate(&memory, &silence, &patterns, 20.0, 0, 0);
        assert!((r.predictable_rhythm - (-0.10 * 1.3)).abs() < 1e-6);
    }

    #[test]
    fn test_appropriate_silence_counts() {
        let memory = SoundMemory::default();
        let mut silence = SilenceTracker::default();
        // Gap 0..4 against tolerance 5: within [2.5, 7.5]
        silence.update(4.0, 1);
        silence.classify_gaps(5.0);
        let patterns = PatternMemory::default();
        let r = calc().calculate(&memory, &silence, &patterns, 10.0, 0, 0);
        assert!((r.appropriate_silence - (-0.05)).abs() < 1e-6);
    }

    #[test]
    fn test_layer_harmony_explicit_and_tag() {
        let mut cfg = SdiConfig::default();
        cfg.harmony_pairs.push(SoundPair {
            sound_a: "rain".into(),
            sound_b: "stream".into(),
            strength: PairStrength::Strong,
        });
        cfg.tag_harmonies.push(TagPair {
            tag_a: "wind".into(),
            tag_b: "foliage".into(),
            strength: PairStrength::Medium,
        });
        let calc = calc_with(cfg, BiomeConfig::default());

        let mut memory = SoundMemory::default();
        memory.add_event(event(1, "rain", "weather").with_tags(["water"]));
        memory.add_event(event(2, "stream", "ambient").with_tags(["water"]));
        memory.add_event(event(3, "gust", "weather").with_tags(["wind"]));
        memory.add_event(event(4, "leaves", "ambient").with_tags(["foliage"]));

        let silence = SilenceTracker::default();
        let patterns = PatternMemory::default();
        let r = calc.calculate(&memory, &silence, &patterns, 1.0, 0, 0);
        let expected = -0.08 * 1.5 + -0.08 * 0.7;
        assert!((r.layer_harmony - expected).abs() < 1e-6);
    }

    #[test]
    fn test_environmental_coherence() {
        let mut biome = BiomeConfig::default();
        biome.sound_pool = vec!["rain".into(), "stream".into()];
        let calc = calc_with(SdiConfig::default(), biome);

        let mut memory = SoundMemory::default();
        memory.add_event(event(1, "rain", "weather"));
        let silence = SilenceTracker::default();
        let patterns = PatternMemory::default();
        let coherent = calc.calculate(&memory, &silence, &patterns, 1.0, 0, 0);
        assert!((coherent.environmental_coherence - (-0.05)).abs() < 1e-6);

        // A foreign sound breaks coherence entirely
        memory.add_event(event(2, "siren", "event"));
        let broken = calc.calculate(&memory, &silence, &patterns, 1.0, 0, 0);
        assert_eq!(broken.environmental_coherence, 0.0);
    }

    #[test]
    fn test_resolution_floor() {
        let memory = SoundMemory::default();
        let silence = SilenceTracker::default();
        let patterns = PatternMemory::default();
        // 10 resolutions would be -1.5 unfloored; floor is -0.25
        let r = calc().calculate(&memory, &silence, &patterns, 1.0, 0, 10);
        assert_eq!(r.resolution, -0.25);
    }
}
