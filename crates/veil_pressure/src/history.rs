//! Time-windowed signal history.
//!
//! A ring buffer of `(timestamp, value)` samples with monotonic
//! timestamps. Pruning pops from the front, so a tick pays O(evicted)
//! rather than rebuilding the buffer.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SignalHistory {
    samples: VecDeque<(f64, f32)>,
    retention: f64,
}

impl SignalHistory {
    pub fn new(retention: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention,
        }
    }

    /// Append a sample. Out-of-order timestamps are dropped with a
    /// warning; history stays monotonic.
    pub fn push(&mut self, timestamp: f64, value: f32) {
        if let Some(&(last, _)) = self.samples.back() {
            if timestamp < last {
                tracing::warn!(timestamp, last, "Out-of-order history sample dropped");
                return;
            }
        }
        self.samples.push_back((timestamp, value));
    }

    /// Drop samples older than the retention horizon.
    pub fn prune(&mut self, now: f64) {
        let horizon = now - self.retention;
        while self.samples.front().is_some_and(|&(t, _)| t < horizon) {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<(f64, f32)> {
        self.samples.back().copied()
    }

    /// Latest sample at or before `t`, scanning backward from the newest.
    pub fn value_at_or_before(&self, t: f64) -> Option<f32> {
        self.samples
            .iter()
            .rev()
            .find(|&&(ts, _)| ts <= t)
            .map(|&(_, v)| v)
    }

    /// Average rate of change over samples in the trailing `window`
    /// seconds: (newest - oldest) / elapsed. Zero with fewer than two
    /// samples in the window.
    pub fn rate_of_change(&self, window: f64, now: f64) -> f32 {
        let horizon = now - window;
        let mut oldest: Option<(f64, f32)> = None;
        let mut newest: Option<(f64, f32)> = None;
        for &(t, v) in self.samples.iter().rev() {
            if t < horizon {
                break;
            }
            newest.get_or_insert((t, v));
            oldest = Some((t, v));
        }
        match (oldest, newest) {
            (Some((t0, v0)), Some((t1, v1))) if t1 > t0 => (v1 - v0) / (t1 - t0) as f32,
            _ => 0.0,
        }
    }

    /// Mean of the last `n` values, if at least `n` exist.
    pub fn mean_of_last(&self, n: usize) -> Option<f32> {
        if n == 0 || self.samples.len() < n {
            return None;
        }
        let sum: f32 = self.samples.iter().rev().take(n).map(|&(_, v)| v).sum();
        Some(sum / n as f32)
    }

    /// Mean of the `n` values immediately preceding the last `n`.
    pub fn mean_of_previous(&self, n: usize) -> Option<f32> {
        if n == 0 || self.samples.len() < 2 * n {
            return None;
        }
        let sum: f32 = self
            .samples
            .iter()
            .rev()
            .skip(n)
            .take(n)
            .map(|&(_, v)| v)
            .sum();
        Some(sum / n as f32)
    }

    pub fn peak(&self) -> Option<f32> {
        self.samples
            .iter()
            .map(|&(_, v)| v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
