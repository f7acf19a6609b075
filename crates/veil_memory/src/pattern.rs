//! Rhythm pattern detection.
//!
//! Watches the occurrence timestamps of each sound id and classifies the
//! interval sequence by its coefficient of variation: tight intervals
//! read as rhythmic, loose ones as drifting, anything looser stays
//! unclassified. A classified pattern whose next occurrence is badly
//! overdue breaks, and the break itself feeds discomfort until it decays
//! or the sound returns.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use veil_core::math::coefficient_of_variation;

/// Interval stability classification for one sound id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Too few occurrences, or intervals too irregular to classify.
    #[default]
    None,
    Rhythmic,
    Drifting,
    Broken,
}

/// CV below which intervals count as rhythmic.
pub const CV_RHYTHMIC: f64 = 0.10;
/// CV below which intervals count as drifting (above: unclassified).
pub const CV_DRIFTING: f64 = 0.40;
/// Occurrences required before classification.
pub const MIN_OCCURRENCES: usize = 3;
/// A pattern breaks once the gap exceeds this many average intervals
/// past the expected occurrence.
pub const BREAK_MULTIPLIER: f64 = 2.0;

/// Tracked interval statistics for one sound id.
#[derive(Debug, Clone)]
pub struct PatternState {
    pub sound_id: String,
    occurrences: VecDeque<f64>,
    intervals: Vec<f64>,
    pub avg_interval: f64,
    pub cv: f64,
    pub pattern_type: PatternType,
    pub expected_next: Option<f64>,
    pub is_broken: bool,
    pub break_start_time: Option<f64>,
}

impl PatternState {
    fn new(sound_id: String) -> Self {
        Self {
            sound_id,
            occurrences: VecDeque::new(),
            intervals: Vec::new(),
            avg_interval: 0.0,
            cv: 0.0,
            pattern_type: PatternType::None,
            expected_next: None,
            is_broken: false,
            break_start_time: None,
        }
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn intervals(&self) -> &[f64] {
        &self.intervals
    }

    /// Record an occurrence. A new occurrence resolves a broken pattern.
    fn add_occurrence(&mut self, timestamp: f64) {
        if self.is_broken {
            tracing::debug!(sound_id = %self.sound_id, "Broken pattern resolved by new occurrence");
            self.is_broken = false;
            self.break_start_time = None;
        }
        self.occurrences.push_back(timestamp);
        self.analyze();
    }

    /// Drop occurrences older than the horizon. Returns true if any
    /// remain.
    fn clear_old(&mut self, horizon: f64) -> bool {
        let before = self.occurrences.len();
        while self.occurrences.front().is_some_and(|&t| t < horizon) {
            self.occurrences.pop_front();
        }
        if self.occurrences.len() != before {
            self.analyze();
        }
        !self.occurrences.is_empty()
    }

    fn analyze(&mut self) {
        self.intervals = self
            .occurrences
            .iter()
            .zip(self.occurrences.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect();

        self.avg_interval = if self.intervals.is_empty() {
            0.0
        } else {
            self.intervals.iter().sum::<f64>() / self.intervals.len() as f64
        };
        self.cv = coefficient_of_variation(&self.intervals);
        self.expected_next = self
            .occurrences
            .back()
            .filter(|_| !self.intervals.is_empty())
            .map(|last| last + self.avg_interval);

        // A standing break is only cleared by a new occurrence
        if self.is_broken {
            return;
        }
        self.pattern_type = if self.occurrences.len() < MIN_OCCURRENCES {
            PatternType::None
        } else if self.cv < CV_RHYTHMIC {
            PatternType::Rhythmic
        } else if self.cv < CV_DRIFTING {
            PatternType::Drifting
        } else {
            PatternType::None
        };
    }

    /// Check whether the pattern has broken by `now`. Only rhythmic and
    /// drifting patterns can break. The break is stamped at the moment
    /// the threshold was crossed, not at the observation time.
    pub fn check_break(&mut self, now: f64) -> bool {
        if !matches!(self.pattern_type, PatternType::Rhythmic | PatternType::Drifting) {
            return false;
        }
        let Some(expected) = self.expected_next else {
            return false;
        };
        let threshold = expected + self.avg_interval * BREAK_MULTIPLIER;
        if now > threshold {
            self.pattern_type = PatternType::Broken;
            self.is_broken = true;
            self.break_start_time = Some(threshold);
            tracing::debug!(sound_id = %self.sound_id, threshold, "Pattern broken");
            true
        } else {
            false
        }
    }

    /// Seconds the pattern has been broken as of `now`.
    pub fn break_duration(&self, now: f64) -> f64 {
        match self.break_start_time {
            Some(start) if self.is_broken => (now - start).max(0.0),
            _ => 0.0,
        }
    }

    /// Deviation of the most recent interval from the average, as a
    /// fraction of the average. Meaningful for drifting patterns.
    pub fn drift_amount(&self) -> f64 {
        if self.intervals.len() < 2 || self.avg_interval <= 0.0 {
            return 0.0;
        }
        let last = self.intervals[self.intervals.len() - 1];
        (last - self.avg_interval).abs() / self.avg_interval
    }
}

/// Summary counts across all tracked patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub total: usize,
    pub rhythmic: usize,
    pub drifting: usize,
    pub broken: usize,
    pub unclassified: usize,
    pub stability_score: f64,
}

/// Per-sound-id pattern registry for one region.
#[derive(Debug)]
pub struct PatternMemory {
    patterns: HashMap<String, PatternState>,
    retention_window: f64,
}

impl Default for PatternMemory {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl PatternMemory {
    pub fn new(retention_window: f64) -> Self {
        Self {
            patterns: HashMap::new(),
            retention_window,
        }
    }

    pub fn record_occurrence(&mut self, sound_id: &str, timestamp: f64) {
        let state = self
            .patterns
            .entry(sound_id.to_string())
            .or_insert_with(|| PatternState::new(sound_id.to_string()));
        state.add_occurrence(timestamp);
        state.clear_old(timestamp - self.retention_window);
    }

    /// Run break checks for every pattern; returns the ids that broke
    /// this call.
    pub fn check_all_breaks(&mut self, now: f64) -> Vec<String> {
        let mut broke = Vec::new();
        for (id, state) in &mut self.patterns {
            if state.check_break(now) {
                broke.push(id.clone());
            }
        }
        broke
    }

    /// Drop stale occurrences everywhere; patterns with none left are
    /// forgotten entirely.
    pub fn cleanup(&mut self, now: f64) {
        let horizon = now - self.retention_window;
        self.patterns.retain(|_, state| state.clear_old(horizon));
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get(&self, sound_id: &str) -> Option<&PatternState> {
        self.patterns.get(sound_id)
    }

    pub fn has(&self, sound_id: &str) -> bool {
        self.patterns.contains_key(sound_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &PatternState> {
        self.patterns.values()
    }

    pub fn by_type(&self, pattern_type: PatternType) -> Vec<&PatternState> {
        self.patterns
            .values()
            .filter(|p| p.pattern_type == pattern_type)
            .collect()
    }

    pub fn count_rhythmic(&self) -> usize {
        self.by_type(PatternType::Rhythmic).len()
    }

    pub fn count_drifting(&self) -> usize {
        self.by_type(PatternType::Drifting).len()
    }

    pub fn count_broken(&self) -> usize {
        self.by_type(PatternType::Broken).len()
    }

    pub fn predict_next(&self, sound_id: &str) -> Option<f64> {
        self.patterns.get(sound_id).and_then(|p| p.expected_next)
    }

    /// Classified, unbroken patterns expected to recur within the window,
    /// sorted by expected time.
    pub fn expected_sounds(&self, now: f64, window: f64) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .patterns
            .values()
            .filter(|p| {
                matches!(p.pattern_type, PatternType::Rhythmic | PatternType::Drifting)
            })
            .filter_map(|p| {
                p.expected_next
                    .filter(|&t| t >= now && t <= now + window)
                    .map(|t| (p.sound_id.clone(), t))
            })
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    // ------------------------------------------------------------------
    // Aggregate signals
    // ------------------------------------------------------------------

    /// Weighted stability over classified patterns: rhythmic patterns
    /// pull the score up, drifting and broken pull it down. Range
    /// roughly [-0.6, 1.0]; 0 with nothing classified.
    pub fn rhythm_stability_score(&self) -> f64 {
        let mut score = 0.0;
        let mut count = 0usize;
        for p in self.patterns.values() {
            match p.pattern_type {
                PatternType::Rhythmic => score += 1.0,
                PatternType::Drifting => score -= 0.3,
                PatternType::Broken => score -= 0.6,
                PatternType::None => continue,
            }
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            score / count as f64
        }
    }

    /// Sum of drift amounts over drifting patterns.
    pub fn total_drift_contribution(&self) -> f64 {
        self.patterns
            .values()
            .filter(|p| p.pattern_type == PatternType::Drifting)
            .map(|p| p.drift_amount())
            .sum()
    }

    /// Per-sound break factors in [0, 1], decaying linearly over
    /// `decay_time` seconds since the break started. Fully decayed breaks
    /// are resolved in place.
    pub fn break_contributions(&mut self, now: f64, decay_time: f64) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        for (id, state) in &mut self.patterns {
            if !state.is_broken || decay_time <= 0.0 {
                continue;
            }
            let elapsed = state.break_duration(now);
            let remaining = 1.0 - elapsed / decay_time;
            if remaining <= 0.0 {
                state.is_broken = false;
                state.break_start_time = None;
                state.analyze();
            } else {
                out.push((id.clone(), remaining));
            }
        }
        out
    }

    pub fn summary(&self) -> PatternSummary {
        PatternSummary {
            total: self.patterns.len(),
            rhythmic: self.count_rhythmic(),
            drifting: self.count_drifting(),
            broken: self.count_broken(),
            unclassified: self.by_type(PatternType::None).len(),
            stability_score: self.rhythm_stability_score(),
        }
    }

    pub fn clear_pattern(&mut self, sound_id: &str) {
        self.patterns.remove(sound_id);
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record_all(mem: &mut PatternMemory, id: &str, times: &[f64]) {
        for &t in times {
            mem.record_occurrence(id, t);
        }
    }

    #[test]
    fn test_unclassified_until_three_occurrences() {
        let mut mem = PatternMemory::default();
        mem.record_occurrence("owl", 0.0);
        mem.record_occurrence("owl", 5.0);
        assert_eq!(mem.get("owl").unwrap().pattern_type, PatternType::None);
        mem.record_occurrence("owl", 10.0);
        assert_eq!(mem.get("owl").unwrap().pattern_type, PatternType::Rhythmic);
    }

    #[test]
    fn test_rhythmic_classification_and_prediction() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "owl", &[0.0, 5.0, 10.0, 15.0]);
        let p = mem.get("owl").unwrap();
        assert_eq!(p.pattern_type, PatternType::Rhythmic);
        assert!((p.avg_interval - 5.0).abs() < 1e-9);
        assert_eq!(p.cv, 0.0);
        assert_eq!(p.expected_next, Some(20.0));
        assert_eq!(mem.predict_next("owl"), Some(20.0));
    }

    #[test]
    fn test_drifting_classification() {
        let mut mem = PatternMemory::default();
        // Intervals 4, 6, 4: cv ~ 0.20
        record_all(&mut mem, "frog", &[0.0, 4.0, 10.0, 14.0]);
        let p = mem.get("frog").unwrap();
        assert_eq!(p.pattern_type, PatternType::Drifting);
        assert!(p.drift_amount() > 0.0);
    }

    #[test]
    fn test_irregular_stays_unclassified() {
        let mut mem = PatternMemory::default();
        // Intervals 1, 20, 2: cv well above the drifting band
        record_all(&mut mem, "twig", &[0.0, 1.0, 21.0, 23.0]);
        assert_eq!(mem.get("twig").unwrap().pattern_type, PatternType::None);
    }

    #[test]
    fn test_break_threshold_and_resolution() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "drip", &[0.0, 2.0, 4.0, 6.0]);
        let p = mem.patterns.get_mut("drip").unwrap();
        assert_eq!(p.pattern_type, PatternType::Rhythmic);
        assert!((p.avg_interval - 2.0).abs() < 1e-9);

        // expected_next = 8; threshold = 8 + 2*2 = 12
        assert!(!p.check_break(8.0));
        assert!(!p.check_break(12.0));
        assert!(p.check_break(13.0));
        assert_eq!(p.pattern_type, PatternType::Broken);
        assert!(p.is_broken);
        // Break stamped where the threshold was crossed
        assert_eq!(p.break_start_time, Some(12.0));
        assert!((p.break_duration(13.0) - 1.0).abs() < 1e-9);

        // New occurrence resolves the break
        mem.record_occurrence("drip", 16.0);
        let p = mem.get("drip").unwrap();
        assert!(!p.is_broken);
        assert_ne!(p.pattern_type, PatternType::Broken);
    }

    #[test]
    fn test_unclassified_patterns_never_break() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "twig", &[0.0, 1.0, 21.0, 23.0]);
        assert!(mem.check_all_breaks(500.0).is_empty());
    }

    #[test]
    fn test_check_all_breaks_reports_ids() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "drip", &[0.0, 2.0, 4.0, 6.0]);
        record_all(&mut mem, "owl", &[0.0, 10.0, 20.0, 30.0]);
        let broke = mem.check_all_breaks(13.0);
        assert_eq!(broke, vec!["drip".to_string()]);
        assert_eq!(mem.count_broken(), 1);
        assert_eq!(mem.count_rhythmic(), 1);
    }

    #[test]
    fn test_break_contribution_decay() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "drip", &[0.0, 2.0, 4.0, 6.0]);
        mem.check_all_breaks(13.0); // break at 12.0

        let c = mem.break_contributions(12.0, 30.0);
        assert!((c[0].1 - 1.0).abs() < 1e-9);
        let c = mem.break_contributions(27.0, 30.0);
        assert!((c[0].1 - 0.5).abs() < 1e-9);

        // Fully decayed: contribution gone and break resolved
        let c = mem.break_contributions(42.0, 30.0);
        assert!(c.is_empty());
        assert!(!mem.get("drip").unwrap().is_broken);
    }

    #[test]
    fn test_stability_score() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "owl", &[0.0, 5.0, 10.0, 15.0]); // rhythmic
        record_all(&mut mem, "frog", &[0.0, 4.0, 10.0, 15.0]); // drifting
        let score = mem.rhythm_stability_score();
        assert!((score - (1.0 - 0.3) / 2.0).abs() < 1e-9);

        let summary = mem.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.rhythmic, 1);
        assert_eq!(summary.drifting, 1);
        assert_eq!(summary.broken, 0);
    }

    #[test]
    fn test_expected_sounds_sorted() {
        let mut mem = PatternMemory::default();
        record_all(&mut mem, "owl", &[0.0, 10.0, 20.0, 30.0]); // next 40
        record_all(&mut mem, "drip", &[0.0, 12.0, 24.0, 36.0]); // next 48
        let expected = mem.expected_sounds(35.0, 20.0);
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0].0, "owl");
        assert_eq!(expected[1].0, "drip");
        // Window excludes both
        assert!(mem.expected_sounds(0.0, 5.0).is_empty());
    }

    #[test]
    fn test_retention_eviction() {
        let mut mem = PatternMemory::new(50.0);
        record_all(&mut mem, "owl", &[0.0, 5.0, 10.0, 60.0]);
        // Recording at t=60 drops everything before t=10
        assert_eq!(mem.get("owl").unwrap().occurrence_count(), 2);

        mem.cleanup(200.0);
        assert!(!mem.has("owl"));
    }

    proptest! {
        #[test]
        fn prop_avg_interval_is_mean_of_deltas(
            start in 0.0f64..100.0,
            deltas in proptest::collection::vec(0.1f64..10.0, 2..10)
        ) {
            let mut mem = PatternMemory::new(1e9);
            let mut t = start;
            mem.record_occurrence("s", t);
            for d in &deltas {
                t += d;
                mem.record_occurrence("s", t);
            }
            let p = mem.get("s").unwrap();
            let expected = deltas.iter().sum::<f64>() / deltas.len() as f64;
            prop_assert!((p.avg_interval - expected).abs() < 1e-6);
            prop_assert_eq!(p.intervals().len(), deltas.len());
            // Classified one way or another once 3 occurrences exist
            prop_assert!(p.expected_next.is_some());
        }
    }
}
