//! Sound event memory.
//!
//! Tracks every sound instance a region has played recently: which are
//! still active, how each one ended, per-sound cooldowns, and cached
//! per-layer / per-band counts for the density factors. All timestamps
//! are simulation-relative seconds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// How a sound instance stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    /// Played out its natural duration.
    Natural,
    /// Cut off early by the scheduler.
    Interrupted,
    /// Auto-ended by cleanup after overrunning its expected end.
    Expired,
}

/// One playing (or played) sound instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundEvent {
    pub instance_id: u64,
    pub sound_id: String,
    pub timestamp: f64,
    /// Natural duration in seconds; 0.0 means open-ended (looping).
    pub duration: f64,
    pub intensity: f32,
    pub layer: String,
    pub frequency_band: String,
    pub tags: BTreeSet<String>,
    pub ended: bool,
    pub end_time: Option<f64>,
    pub end_type: Option<EndType>,
}

impl SoundEvent {
    pub fn new(
        instance_id: u64,
        sound_id: impl Into<String>,
        timestamp: f64,
        duration: f64,
        intensity: f32,
        layer: impl Into<String>,
        frequency_band: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            sound_id: sound_id.into(),
            timestamp,
            duration,
            intensity,
            layer: layer.into(),
            frequency_band: frequency_band.into(),
            tags: BTreeSet::new(),
            ended: false,
            end_time: None,
            end_type: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// When this event is expected to stop, or `None` for open-ended
    /// sounds.
    pub fn expected_end_time(&self) -> Option<f64> {
        (self.duration > 0.0).then(|| self.timestamp + self.duration)
    }

    /// Realized duration once ended, otherwise elapsed so far.
    pub fn actual_duration(&self, now: f64) -> f64 {
        match self.end_time {
            Some(end) => (end - self.timestamp).max(0.0),
            None => (now - self.timestamp).max(0.0),
        }
    }

    pub fn is_active_at(&self, t: f64) -> bool {
        if t < self.timestamp {
            return false;
        }
        match self.end_time {
            Some(end) => t < end,
            None => !self.ended,
        }
    }

    /// Seconds this event has run past 150% of its natural duration.
    /// Open-ended and ended events never overstay.
    pub fn overstay(&self, now: f64) -> f64 {
        if self.ended || self.duration <= 0.0 {
            return 0.0;
        }
        (now - (self.timestamp + self.duration * 1.5)).max(0.0)
    }
}

/// Bounded memory of recent sound events for one region.
#[derive(Debug)]
pub struct SoundMemory {
    events: Vec<SoundEvent>,
    by_instance: HashMap<u64, usize>,
    active: HashSet<u64>,
    layer_counts: HashMap<String, usize>,
    band_counts: HashMap<String, usize>,
    cooldowns: HashMap<String, f64>,
    retention_window: f64,
    max_events: usize,
}

impl Default for SoundMemory {
    fn default() -> Self {
        Self::new(60.0, 200)
    }
}

impl SoundMemory {
    pub fn new(retention_window: f64, max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            by_instance: HashMap::new(),
            active: HashSet::new(),
            layer_counts: HashMap::new(),
            band_counts: HashMap::new(),
            cooldowns: HashMap::new(),
            retention_window,
            max_events: max_events.max(1),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert a new event into the active set. A duplicate `instance_id`
    /// is ignored with a warning.
    pub fn add_event(&mut self, event: SoundEvent) {
        if self.by_instance.contains_key(&event.instance_id) {
            tracing::warn!(instance_id = event.instance_id, "Duplicate sound instance ignored");
            return;
        }
        if self.events.len() >= self.max_events {
            self.evict_oldest();
        }
        *self.layer_counts.entry(event.layer.clone()).or_insert(0) += 1;
        *self.band_counts.entry(event.frequency_band.clone()).or_insert(0) += 1;
        self.active.insert(event.instance_id);
        self.by_instance.insert(event.instance_id, self.events.len());
        self.events.push(event);
    }

    /// End an active event, stamping its end time and type. Returns the
    /// closed event, or `None` if unknown or already ended.
    pub fn end_event(&mut self, instance_id: u64, timestamp: f64, end_type: EndType) -> Option<SoundEvent> {
        if !self.active.remove(&instance_id) {
            return None;
        }
        let idx = *self.by_instance.get(&instance_id)?;
        let event = &mut self.events[idx];
        event.ended = true;
        event.end_time = Some(timestamp.max(event.timestamp));
        event.end_type = Some(end_type);
        decrement(&mut self.layer_counts, &event.layer);
        decrement(&mut self.band_counts, &event.frequency_band);
        Some(event.clone())
    }

    /// End the first active instance of a sound id.
    pub fn end_event_by_sound_id(&mut self, sound_id: &str, timestamp: f64, end_type: EndType) -> Option<SoundEvent> {
        let instance = self
            .active
            .iter()
            .filter_map(|id| self.by_instance.get(id).map(|&i| &self.events[i]))
            .filter(|e| e.sound_id == sound_id)
            .min_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
            .map(|e| e.instance_id)?;
        self.end_event(instance, timestamp, end_type)
    }

    /// Auto-end actives that overran their expected end, drop events past
    /// the retention window and expired cooldowns. Returns the number of
    /// events dropped.
    pub fn cleanup(&mut self, now: f64) -> usize {
        let expired: Vec<u64> = self
            .active_events()
            .filter(|e| e.expected_end_time().is_some_and(|end| now >= end))
            .map(|e| e.instance_id)
            .collect();
        for id in expired {
            // Stamp the end at the expected time, not the cleanup time
            let end = self
                .by_instance
                .get(&id)
                .and_then(|&i| self.events[i].expected_end_time())
                .unwrap_or(now);
            self.end_event(id, end, EndType::Expired);
        }

        let horizon = now - self.retention_window;
        let before = self.events.len();
        let active = &self.active;
        self.events
            .retain(|e| e.timestamp >= horizon || active.contains(&e.instance_id));
        let dropped = before - self.events.len();
        if dropped > 0 {
            self.rebuild_index();
        }

        self.cooldowns.retain(|_, until| *until > now);
        dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.by_instance.clear();
        self.active.clear();
        self.layer_counts.clear();
        self.band_counts.clear();
        self.cooldowns.clear();
    }

    fn evict_oldest(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let evicted = self.events.remove(0);
        if self.active.remove(&evicted.instance_id) {
            decrement(&mut self.layer_counts, &evicted.layer);
            decrement(&mut self.band_counts, &evicted.frequency_band);
        }
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.by_instance = self
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.instance_id, i))
            .collect();
        self.active.retain(|id| self.by_instance.contains_key(id));
    }

    // ------------------------------------------------------------------
    // Cooldowns
    // ------------------------------------------------------------------

    /// Store an absolute time before which the sound should not replay.
    pub fn set_cooldown(&mut self, sound_id: impl Into<String>, until: f64) {
        self.cooldowns.insert(sound_id.into(), until);
    }

    pub fn is_on_cooldown(&self, sound_id: &str, now: f64) -> bool {
        self.cooldowns.get(sound_id).is_some_and(|until| now < *until)
    }

    pub fn cooldown_remaining(&self, sound_id: &str, now: f64) -> f64 {
        self.cooldowns
            .get(sound_id)
            .map(|until| (until - now).max(0.0))
            .unwrap_or(0.0)
    }

    // ------------------------------------------------------------------
    // Active-set queries
    // ------------------------------------------------------------------

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn total_events(&self) -> usize {
        self.events.len()
    }

    pub fn active_events(&self) -> impl Iterator<Item = &SoundEvent> {
        self.active
            .iter()
            .filter_map(|id| self.by_instance.get(id).map(|&i| &self.events[i]))
    }

    pub fn active_ids(&self) -> Vec<u64> {
        self.active.iter().copied().collect()
    }

    pub fn has_active_sound(&self, sound_id: &str) -> bool {
        self.active_events().any(|e| e.sound_id == sound_id)
    }

    pub fn active_by_layer(&self, layer: &str) -> Vec<&SoundEvent> {
        self.active_events().filter(|e| e.layer == layer).collect()
    }

    pub fn active_by_sound_id(&self, sound_id: &str) -> Vec<&SoundEvent> {
        self.active_events().filter(|e| e.sound_id == sound_id).collect()
    }

    pub fn active_by_tag(&self, tag: &str) -> Vec<&SoundEvent> {
        self.active_events().filter(|e| e.tags.contains(tag)).collect()
    }

    pub fn active_by_frequency(&self, band: &str) -> Vec<&SoundEvent> {
        self.active_events().filter(|e| e.frequency_band == band).collect()
    }

    pub fn active_tags(&self) -> BTreeSet<String> {
        self.active_events().flat_map(|e| e.tags.iter().cloned()).collect()
    }

    pub fn layer_count(&self, layer: &str) -> usize {
        self.layer_counts.get(layer).copied().unwrap_or(0)
    }

    pub fn frequency_count(&self, band: &str) -> usize {
        self.band_counts.get(band).copied().unwrap_or(0)
    }

    /// Layers with at least one active event, with their counts.
    pub fn layer_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.layer_counts
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(k, &n)| (k.as_str(), n))
    }

    // ------------------------------------------------------------------
    // Pair queries
    // ------------------------------------------------------------------

    /// True if both sound ids have an active instance right now.
    pub fn check_sound_pair_active(&self, sound_a: &str, sound_b: &str) -> bool {
        self.has_active_sound(sound_a) && self.has_active_sound(sound_b)
    }

    /// Distinct instance pairs where one carries `tag_a` and the other
    /// `tag_b`.
    pub fn active_with_tag_pair(&self, tag_a: &str, tag_b: &str) -> Vec<(u64, u64)> {
        let mut pairs = Vec::new();
        for a in self.active_events().filter(|e| e.tags.contains(tag_a)) {
            for b in self.active_events().filter(|e| e.tags.contains(tag_b)) {
                if a.instance_id != b.instance_id {
                    pairs.push((a.instance_id, b.instance_id));
                }
            }
        }
        pairs
    }

    /// Unordered pairs of distinct sound ids currently active.
    pub fn active_sound_pairs(&self) -> Vec<(String, String)> {
        let mut ids: Vec<String> = self
            .active_events()
            .map(|e| e.sound_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        let mut pairs = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                pairs.push((ids[i].clone(), ids[j].clone()));
            }
        }
        pairs
    }

    // ------------------------------------------------------------------
    // History queries
    // ------------------------------------------------------------------

    /// Last `n` events in insertion order.
    pub fn recent_events(&self, n: usize) -> &[SoundEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    pub fn events_in_window(&self, start: f64, end: f64) -> Vec<&SoundEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect()
    }

    pub fn events_by_sound_id(&self, sound_id: &str, limit: usize) -> Vec<&SoundEvent> {
        let mut matches: Vec<&SoundEvent> =
            self.events.iter().filter(|e| e.sound_id == sound_id).collect();
        if matches.len() > limit {
            matches.drain(..matches.len() - limit);
        }
        matches
    }

    /// Start timestamps of every remembered occurrence of a sound id, in
    /// insertion order.
    pub fn occurrence_timestamps(&self, sound_id: &str) -> Vec<f64> {
        self.events
            .iter()
            .filter(|e| e.sound_id == sound_id)
            .map(|e| e.timestamp)
            .collect()
    }

    pub fn count_recent_occurrences(&self, sound_id: &str, window: f64, now: f64) -> usize {
        let horizon = now - window;
        self.events
            .iter()
            .filter(|e| e.sound_id == sound_id && e.timestamp >= horizon)
            .count()
    }

    pub fn last_occurrence(&self, sound_id: &str) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| e.sound_id == sound_id)
            .map(|e| e.timestamp)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))))
    }

    pub fn time_since_last(&self, sound_id: &str, now: f64) -> Option<f64> {
        self.last_occurrence(sound_id).map(|t| (now - t).max(0.0))
    }
}

fn decrement(counts: &mut HashMap<String, usize>, key: &str) {
    if let Some(n) = counts.get_mut(key) {
        *n = n.saturating_sub(1);
    }
}
