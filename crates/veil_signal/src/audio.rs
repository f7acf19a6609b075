//! The audio channel: memory layer plus SDI computation for one region.

use std::collections::VecDeque;
use veil_core::{DiscomfortSource, VeilConfig};
use veil_memory::{EndType, PatternMemory, SilenceTracker, SoundEvent, SoundMemory};

use crate::calculator::{SignalCalculator, SignalFrame};
use crate::comfort::ComfortCalculator;
use crate::discomfort::DiscomfortCalculator;

/// Owns the per-region sound memories and turns them into the audio
/// discomfort signal each tick. Playback feeds events in through
/// [`record_sound_start`](AudioChannel::record_sound_start) /
/// [`record_sound_end`](AudioChannel::record_sound_end); the coordinator
/// drives it through [`DiscomfortSource`].
pub struct AudioChannel {
    memory: SoundMemory,
    silence: SilenceTracker,
    patterns: PatternMemory,
    discomfort: DiscomfortCalculator,
    comfort: ComfortCalculator,
    calculator: SignalCalculator,
    baseline: f32,
    silence_tolerance: f64,
    comfort_window: f64,
    transitions: VecDeque<f64>,
    resolutions: VecDeque<f64>,
    last_frame: SignalFrame,
}

impl AudioChannel {
    pub fn new(cfg: &VeilConfig) -> Self {
        Self {
            memory: SoundMemory::default(),
            silence: SilenceTracker::default(),
            patterns: PatternMemory::default(),
            discomfort: DiscomfortCalculator::new(cfg.sdi.clone(), cfg.biome.clone()),
            comfort: ComfortCalculator::new(cfg.sdi.clone(), cfg.biome.clone()),
            calculator: SignalCalculator::new(cfg.signal.clone()),
            baseline: cfg.biome.baseline,
            silence_tolerance: cfg.biome.silence_tolerance,
            comfort_window: cfg.sdi.silence_comfort_window,
            transitions: VecDeque::new(),
            resolutions: VecDeque::new(),
            last_frame: SignalFrame::default(),
        }
    }

    /// Register a sound starting: enters the active set and counts as a
    /// pattern occurrence for its sound id.
    pub fn record_sound_start(&mut self, event: SoundEvent) {
        tracing::trace!(sound_id = %event.sound_id, timestamp = event.timestamp, "Sound started");
        self.patterns.record_occurrence(&event.sound_id, event.timestamp);
        self.memory.add_event(event);
    }

    pub fn record_sound_end(
        &mut self,
        instance_id: u64,
        timestamp: f64,
        end_type: EndType,
    ) -> Option<SoundEvent> {
        self.memory.end_event(instance_id, timestamp, end_type)
    }

    /// Note a smooth crossfade; feeds the gradual-transition comfort
    /// factor for the next minute.
    pub fn note_transition(&mut self, timestamp: f64) {
        self.transitions.push_back(timestamp);
    }

    /// Note a tension resolution (storm ending, threat passing).
    pub fn note_resolution(&mut self, timestamp: f64) {
        self.resolutions.push_back(timestamp);
    }

    pub fn memory(&self) -> &SoundMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut SoundMemory {
        &mut self.memory
    }

    pub fn silence(&self) -> &SilenceTracker {
        &self.silence
    }

    pub fn patterns(&self) -> &PatternMemory {
        &self.patterns
    }

    pub fn last_frame(&self) -> SignalFrame {
        self.last_frame
    }

    fn prune_notes(&mut self, now: f64) {
        let horizon = now - self.comfort_window;
        while self.transitions.front().is_some_and(|&t| t < horizon) {
            self.transitions.pop_front();
        }
        while self.resolutions.front().is_some_and(|&t| t < horizon) {
            self.resolutions.pop_front();
        }
    }
}

impl DiscomfortSource for AudioChannel {
    fn advance(&mut self, population: f32, now: f64, dt: f64) -> f32 {
        self.memory.cleanup(now);
        self.patterns.check_all_breaks(now);
        self.patterns.cleanup(now);
        self.prune_notes(now);

        if let Some(gap) = self.silence.update(now, self.memory.active_count()) {
            if SilenceTracker::was_gap_appropriate(&gap, self.silence_tolerance) {
                let last = self.silence.total_gaps() - 1;
                self.silence.mark_gap_appropriate(last);
            }
        }

        let d = self
            .discomfort
            .calculate(&self.memory, &self.silence, &mut self.patterns, now);
        let c = self.comfort.calculate(
            &self.memory,
            &self.silence,
            &self.patterns,
            now,
            self.transitions.len(),
            self.resolutions.len(),
        );

        let raw = self.baseline + d.total + c.total;
        self.last_frame = self.calculator.advance(raw, population, dt);
        self.last_frame.smoothed
    }

    fn reset(&mut self) {
        self.memory.clear();
        self.silence.reset();
        self.patterns.clear();
        self.calculator.reset();
        self.transitions.clear();
        self.resolutions.clear();
        self.last_frame = SignalFrame::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> AudioChannel {
        AudioChannel::new(&VeilConfig::default())
    }

    fn event(id: u64, sound: &str, t: f64) -> SoundEvent {
        SoundEvent::new(id, sound, t, 0.0, 0.8, "ambient", "mid")
    }

    #[test]
    fn test_quiet_channel_tracks_population_curve() {
        let mut ch = channel();
        ch.advance(0.0, 0.0, 0.1);
        // Hold: converges near curve(0) = -0.3
        for i in 1..100 {
            ch.advance(0.0, i as f64 * 0.5, 0.5);
        }
        let frame = ch.last_frame();
        assert!((frame.smoothed - (-0.30)).abs() < 0.05);
    }

    #[test]
    fn test_crowding_raises_signal() {
        let mut ch = channel();
        let mut t = 0.0;
        ch.advance(0.0, t, 0.5);
        let quiet = ch.last_frame().smoothed;
        for _ in 0..40 {
            t += 0.5;
            ch.advance(0.9, t, 0.5);
        }
        assert!(ch.last_frame().smoothed > quiet);
    }

    #[test]
    fn test_sound_start_feeds_patterns_and_memory() {
        let mut ch = channel();
        for (i, t) in [0.0, 5.0, 10.0, 15.0].iter().enumerate() {
            ch.record_sound_start(event(i as u64, "owl", *t));
        }
        assert_eq!(ch.memory().active_count(), 4);
        assert_eq!(ch.patterns().get("owl").unwrap().expected_next, Some(20.0));
    }

    #[test]
    fn test_silence_gap_classified_on_close() {
        let mut ch = channel();
        // Silent from 0; sound appears at t=4 (tolerance 5 -> appropriate)
        ch.record_sound_start(event(1, "wind", 4.0));
        ch.advance(0.2, 4.0, 0.5);
        assert_eq!(ch.silence().count_appropriate_recent(60.0, 4.0), 1);
    }

    #[test]
    fn test_reset_returns_to_cold_state() {
        let mut ch = channel();
        ch.record_sound_start(event(1, "wind", 0.0));
        ch.note_transition(0.0);
        ch.advance(0.5, 1.0, 1.0);
        ch.reset();
        assert_eq!(ch.memory().active_count(), 0);
        assert_eq!(ch.last_frame(), SignalFrame::default());
        assert!(ch.silence().in_silence());
    }
}
