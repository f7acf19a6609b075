//! Silence gap tracking.
//!
//! A two-state machine over the region's active sound count. The world
//! starts in silence at t=0. Every completed gap is recorded, however
//! short; whether a gap was "appropriate" for the biome is a separate
//! classification applied downstream.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A completed period with zero active sounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceGap {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub was_appropriate: bool,
}

#[derive(Debug)]
pub struct SilenceTracker {
    in_silence: bool,
    silence_start: f64,
    /// When the last silence period ended; `None` until the first gap
    /// closes.
    last_silence_end: Option<f64>,
    gaps: VecDeque<SilenceGap>,
    max_gaps: usize,
}

impl Default for SilenceTracker {
    fn default() -> Self {
        Self::new(20)
    }
}

impl SilenceTracker {
    pub fn new(max_gaps: usize) -> Self {
        Self {
            in_silence: true,
            silence_start: 0.0,
            last_silence_end: None,
            gaps: VecDeque::new(),
            max_gaps: max_gaps.max(1),
        }
    }

    /// Feed the current active sound count. Returns the completed gap
    /// when silence just ended.
    pub fn update(&mut self, timestamp: f64, sound_count: usize) -> Option<SilenceGap> {
        if self.in_silence && sound_count > 0 {
            let gap = SilenceGap {
                start: self.silence_start,
                end: timestamp,
                duration: (timestamp - self.silence_start).max(0.0),
                was_appropriate: false,
            };
            self.in_silence = false;
            self.last_silence_end = Some(timestamp);
            self.push_gap(gap);
            tracing::debug!(duration = gap.duration, "Silence gap closed");
            return Some(gap);
        }
        if !self.in_silence && sound_count == 0 {
            self.in_silence = true;
            self.silence_start = timestamp;
        }
        None
    }

    /// Force a transition into silence regardless of sound count.
    pub fn force_start_silence(&mut self, timestamp: f64) {
        if !self.in_silence {
            self.in_silence = true;
            self.silence_start = timestamp;
        }
    }

    /// Force silence to end, closing and returning the gap.
    pub fn force_end_silence(&mut self, timestamp: f64) -> Option<SilenceGap> {
        if self.in_silence {
            self.update(timestamp, 1)
        } else {
            None
        }
    }

    fn push_gap(&mut self, gap: SilenceGap) {
        if self.gaps.len() >= self.max_gaps {
            self.gaps.pop_front();
        }
        self.gaps.push_back(gap);
    }

    // ------------------------------------------------------------------
    // Deprivation
    // ------------------------------------------------------------------

    pub fn in_silence(&self) -> bool {
        self.in_silence
    }

    pub fn current_silence_duration(&self, now: f64) -> f64 {
        if self.in_silence {
            (now - self.silence_start).max(0.0)
        } else {
            0.0
        }
    }

    /// Seconds since silence last ended: 0 while silent, `now` if silence
    /// has never ended.
    pub fn time_since_silence(&self, now: f64) -> f64 {
        if self.in_silence {
            return 0.0;
        }
        match self.last_silence_end {
            Some(end) => (now - end).max(0.0),
            None => now.max(0.0),
        }
    }

    pub fn is_deprived(&self, now: f64, tolerance: f64) -> bool {
        tolerance > 0.0 && self.time_since_silence(now) > tolerance
    }

    /// How far past tolerance the region is, as a multiple of tolerance.
    /// 0 when within tolerance; unbounded above.
    pub fn deprivation_factor(&self, now: f64, tolerance: f64) -> f64 {
        if tolerance <= 0.0 {
            return 0.0;
        }
        ((self.time_since_silence(now) - tolerance) / tolerance).max(0.0)
    }

    // ------------------------------------------------------------------
    // Gap classification and history
    // ------------------------------------------------------------------

    /// A gap is appropriate when its duration falls within 50%-150% of
    /// the biome's silence tolerance.
    pub fn was_gap_appropriate(gap: &SilenceGap, tolerance: f64) -> bool {
        gap.duration >= 0.5 * tolerance && gap.duration <= 1.5 * tolerance
    }

    /// Flag a recorded gap as appropriate. Idempotent; false for an
    /// out-of-range index.
    pub fn mark_gap_appropriate(&mut self, index: usize) -> bool {
        match self.gaps.get_mut(index) {
            Some(gap) => {
                gap.was_appropriate = true;
                true
            }
            None => false,
        }
    }

    /// Classify every recorded gap against a tolerance in one pass.
    pub fn classify_gaps(&mut self, tolerance: f64) {
        for gap in &mut self.gaps {
            if Self::was_gap_appropriate(gap, tolerance) {
                gap.was_appropriate = true;
            }
        }
    }

    pub fn total_gaps(&self) -> usize {
        self.gaps.len()
    }

    pub fn recent_gaps(&self, n: usize) -> Vec<SilenceGap> {
        self.gaps.iter().rev().take(n).rev().copied().collect()
    }

    pub fn gaps_in_window(&self, window: f64, now: f64) -> Vec<SilenceGap> {
        let horizon = now - window;
        self.gaps.iter().filter(|g| g.end >= horizon).copied().collect()
    }

    pub fn count_appropriate_recent(&self, window: f64, now: f64) -> usize {
        let horizon = now - window;
        self.gaps
            .iter()
            .filter(|g| g.end >= horizon && g.was_appropriate)
            .count()
    }

    pub fn average_gap_duration(&self, n: usize) -> f64 {
        let recent: Vec<f64> = self.gaps.iter().rev().take(n).map(|g| g.duration).collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<f64>() / recent.len() as f64
    }

    pub fn appropriate_ratio(&self) -> f64 {
        if self.gaps.is_empty() {
            return 0.0;
        }
        let appropriate = self.gaps.iter().filter(|g| g.was_appropriate).count();
        appropriate as f64 / self.gaps.len() as f64
    }

    pub fn reset(&mut self) {
        self.in_silence = true;
        self.silence_start = 0.0;
        self.last_silence_end = None;
        self.gaps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_closed_with_duration() {
        let mut tracker = SilenceTracker::default();
        // Sound starts at t=10: closes the initial silence (0..10)
        let first = tracker.update(10.0, 1).unwrap();
        assert_eq!(first.duration, 10.0);

        // Silence reopens at t=10, sound returns at t=15
        tracker.update(10.0, 0);
        let gap = tracker.update(15.0, 1).unwrap();
        assert_eq!(gap.start, 10.0);
        assert_eq!(gap.end, 15.0);
        assert_eq!(gap.duration, 5.0);
    }

    #[test]
    fn test_no_transition_no_gap() {
        let mut tracker = SilenceTracker::default();
        tracker.update(5.0, 1);
        assert!(tracker.update(6.0, 2).is_none());
        assert!(tracker.update(7.0, 1).is_none());
    }

    #[test]
    fn test_short_gaps_are_still_recorded() {
        let mut tracker = SilenceTracker::default();
        tracker.update(1.0, 1);
        tracker.update(2.0, 0);
        let gap = tracker.update(2.5, 3).unwrap();
        assert_eq!(gap.duration, 0.5);
        assert_eq!(tracker.total_gaps(), 2);
    }

    #[test]
    fn test_time_since_silence() {
        let mut tracker = SilenceTracker::default();
        // Still inside the initial silence
        assert_eq!(tracker.time_since_silence(7.0), 0.0);

        tracker.update(10.0, 1);
        assert_eq!(tracker.time_since_silence(18.0), 8.0);

        tracker.update(20.0, 0);
        assert_eq!(tracker.time_since_silence(25.0), 0.0);
        assert_eq!(tracker.current_silence_duration(25.0), 5.0);
    }

    #[test]
    fn test_deprivation_factor_unbounded() {
        let mut tracker = SilenceTracker::default();
        tracker.update(0.0, 1);
        let tolerance = 5.0;
        assert!(!tracker.is_deprived(4.0, tolerance));
        assert_eq!(tracker.deprivation_factor(4.0, tolerance), 0.0);
        assert!(tracker.is_deprived(6.0, tolerance));
        // 25s past a 5s tolerance = factor 5.0, well above any cap
        assert!((tracker.deprivation_factor(30.0, tolerance) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_appropriate_classification() {
        let gap = SilenceGap { start: 0.0, end: 4.0, duration: 4.0, was_appropriate: false };
        assert!(SilenceTracker::was_gap_appropriate(&gap, 5.0));
        let short = SilenceGap { start: 0.0, end: 1.0, duration: 1.0, was_appropriate: false };
        assert!(!SilenceTracker::was_gap_appropriate(&short, 5.0));
        let long = SilenceGap { start: 0.0, end: 9.0, duration: 9.0, was_appropriate: false };
        assert!(!SilenceTracker::was_gap_appropriate(&long, 5.0));
    }

    #[test]
    fn test_mark_gap_appropriate_idempotent() {
        let mut tracker = SilenceTracker::default();
        tracker.update(5.0, 1);
        assert!(tracker.mark_gap_appropriate(0));
        assert!(tracker.mark_gap_appropriate(0));
        assert_eq!(tracker.appropriate_ratio(), 1.0);
        assert!(!tracker.mark_gap_appropriate(7));
    }

    #[test]
    fn test_gap_history_bounded() {
        let mut tracker = SilenceTracker::new(3);
        let mut t = 0.0;
        for _ in 0..6 {
            tracker.update(t, 1);
            t += 1.0;
            tracker.update(t, 0);
            t += 1.0;
        }
        assert_eq!(tracker.total_gaps(), 3);
    }

    #[test]
    fn test_window_and_average_queries() {
        let mut tracker = SilenceTracker::default();
        tracker.update(2.0, 1); // gap 0..2
        tracker.update(3.0, 0);
        tracker.update(7.0, 1); // gap 3..7
        tracker.classify_gaps(4.0);

        assert_eq!(tracker.gaps_in_window(6.0, 8.0).len(), 2);
        assert_eq!(tracker.gaps_in_window(0.5, 8.0).len(), 0);
        assert_eq!(tracker.count_appropriate_recent(10.0, 8.0), 2);
        assert!((tracker.average_gap_duration(2) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_force_transitions() {
        let mut tracker = SilenceTracker::default();
        let gap = tracker.force_end_silence(4.0).unwrap();
        assert_eq!(gap.duration, 4.0);
        assert!(!tracker.in_silence());

        tracker.force_start_silence(6.0);
        assert!(tracker.in_silence());
        assert_eq!(tracker.current_silence_duration(9.0), 3.0);
    }
}
