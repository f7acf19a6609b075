//! Cross-modal, multi-region pressure coordination.
//!
//! The coordinator owns every region's pressure state and is the only
//! writer. Each tick it ingests the raw SDI/VDI values, detects audio
//! spikes, holds the visual signal at its pre-spike value while a block
//! is live (audio must always lead, the two must never spike together),
//! blends the pair into combined pressure, classifies the trend, and
//! propagates decaying attraction signals from crowded regions toward
//! calmer ones. External readers only ever see snapshot copies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use veil_core::config::PressureConfig;
use veil_core::math::sanitize_f32;
use veil_core::{DiscomfortSource, Trend};

use crate::attraction::AttractionField;
use crate::error::PressureError;
use crate::history::SignalHistory;

/// Stable handle for a registered region. Indexes dense storage; the
/// external string id is only touched at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegionHandle(pub(crate) usize);

impl RegionHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Read-consistent copy of one region's pressure state. Flat and
/// serializable; the transport layer ships it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPressureSnapshot {
    pub region_id: String,
    pub population: f32,
    pub sim_time: f64,
    pub sdi: f32,
    pub vdi_raw: f32,
    pub vdi_modulated: f32,
    pub combined_pressure: f32,
    pub pressure_trend: Trend,
    pub sdi_rate: f32,
    pub spike_blocked: bool,
    pub last_sdi_spike: Option<f64>,
    pub vdi_blocked_until: f64,
    pub broadcasting: bool,
    pub receiving_attraction: f32,
}

/// Default signal source when a region is registered without its own
/// channels: a two-slope population curve with exponential smoothing.
struct CurveSource {
    breakpoint: f32,
    below_slope: f32,
    above_slope: f32,
    smoothing: f32,
    value: f32,
    initialized: bool,
}

impl CurveSource {
    fn sdi() -> Self {
        Self {
            breakpoint: 0.30,
            below_slope: 0.5,
            above_slope: 1.0,
            smoothing: 0.15,
            value: 0.0,
            initialized: false,
        }
    }

    fn vdi() -> Self {
        Self {
            breakpoint: 0.25,
            below_slope: 0.6,
            above_slope: 0.9,
            smoothing: 0.08,
            value: 0.0,
            initialized: false,
        }
    }
}

impl DiscomfortSource for CurveSource {
    fn advance(&mut self, population: f32, _now: f64, dt: f64) -> f32 {
        let p = population.clamp(0.0, 1.0);
        let slope = if p < self.breakpoint {
            self.below_slope
        } else {
            self.above_slope
        };
        let target = (p - self.breakpoint) * slope;
        if !self.initialized {
            self.value = target;
            self.initialized = true;
        } else {
            let alpha = ((self.smoothing as f64 * dt).min(1.0)) as f32;
            self.value += (target - self.value) * alpha;
        }
        self.value
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}

struct RegionState {
    id: String,
    position: (f32, f32),
    population: f32,
    sim_time: f64,
    sdi_source: Box<dyn DiscomfortSource>,
    vdi_source: Box<dyn DiscomfortSource>,
    sdi_history: SignalHistory,
    vdi_history: SignalHistory,
    sdi: f32,
    vdi_raw: f32,
    vdi_modulated: f32,
    combined: f32,
    trend: Trend,
    sdi_rate: f32,
    last_sdi_spike: Option<f64>,
    vdi_blocked_until: f64,
    broadcasting: bool,
    receiving_attraction: f32,
}

impl RegionState {
    fn snapshot(&self) -> RegionPressureSnapshot {
        RegionPressureSnapshot {
            region_id: self.id.clone(),
            population: self.population,
            sim_time: self.sim_time,
            sdi: self.sdi,
            vdi_raw: self.vdi_raw,
            vdi_modulated: self.vdi_modulated,
            combined_pressure: self.combined,
            pressure_trend: self.trend,
            sdi_rate: self.sdi_rate,
            spike_blocked: self.sim_time < self.vdi_blocked_until,
            last_sdi_spike: self.last_sdi_spike,
            vdi_blocked_until: self.vdi_blocked_until,
            broadcasting: self.broadcasting,
            receiving_attraction: self.receiving_attraction,
        }
    }

    fn reset(&mut self, retention: f64) {
        self.population = 0.0;
        self.sim_time = 0.0;
        self.sdi_source.reset();
        self.vdi_source.reset();
        self.sdi_history = SignalHistory::new(retention);
        self.vdi_history = SignalHistory::new(retention);
        self.sdi = 0.0;
        self.vdi_raw = 0.0;
        self.vdi_modulated = 0.0;
        self.combined = 0.0;
        self.trend = Trend::Stable;
        self.sdi_rate = 0.0;
        self.last_sdi_spike = None;
        self.vdi_blocked_until = 0.0;
        self.broadcasting = false;
        self.receiving_attraction = 0.0;
    }
}

/// Single writer for all per-region pressure state.
pub struct PressureCoordinator {
    cfg: PressureConfig,
    regions: Vec<RegionState>,
    handles: HashMap<String, RegionHandle>,
    field: AttractionField,
    /// Simulated time the field has been decayed to, the max of all
    /// region clocks. Keeps per-region ticking from aging the shared
    /// field once per region per frame.
    field_clock: f64,
}

impl Default for PressureCoordinator {
    fn default() -> Self {
        Self::new(PressureConfig::default())
    }
}

impl PressureCoordinator {
    pub fn new(cfg: PressureConfig) -> Self {
        let field = AttractionField::new(cfg.attraction_duration, cfg.max_attraction_signals);
        Self {
            cfg,
            regions: Vec::new(),
            handles: HashMap::new(),
            field,
            field_clock: 0.0,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a region with the default population-curve sources.
    /// Re-registering an existing id updates its position and returns
    /// the existing handle.
    pub fn add_region(&mut self, region_id: &str, position: (f32, f32)) -> RegionHandle {
        self.add_region_with_sources(
            region_id,
            position,
            Box::new(CurveSource::sdi()),
            Box::new(CurveSource::vdi()),
        )
    }

    /// Register a region backed by caller-supplied signal sources (e.g.
    /// full audio/visual channels).
    pub fn add_region_with_sources(
        &mut self,
        region_id: &str,
        position: (f32, f32),
        sdi_source: Box<dyn DiscomfortSource>,
        vdi_source: Box<dyn DiscomfortSource>,
    ) -> RegionHandle {
        if let Some(&handle) = self.handles.get(region_id) {
            tracing::warn!(region_id, "Region re-registered; position updated");
            self.regions[handle.0].position = position;
            return handle;
        }
        let handle = RegionHandle(self.regions.len());
        self.regions.push(RegionState {
            id: region_id.to_string(),
            position,
            population: 0.0,
            sim_time: 0.0,
            sdi_source,
            vdi_source,
            sdi_history: SignalHistory::new(self.cfg.history_retention),
            vdi_history: SignalHistory::new(self.cfg.history_retention),
            sdi: 0.0,
            vdi_raw: 0.0,
            vdi_modulated: 0.0,
            combined: 0.0,
            trend: Trend::Stable,
            sdi_rate: 0.0,
            last_sdi_spike: None,
            vdi_blocked_until: 0.0,
            broadcasting: false,
            receiving_attraction: 0.0,
        });
        self.handles.insert(region_id.to_string(), handle);
        tracing::debug!(region_id, "Region registered");
        handle
    }

    pub fn handle(&self, region_id: &str) -> Option<RegionHandle> {
        self.handles.get(region_id).copied()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn lookup(&self, region_id: &str) -> Result<RegionHandle, PressureError> {
        self.handle(region_id)
            .ok_or_else(|| PressureError::UnknownRegion(region_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Set a region's population ratio; out-of-range and non-finite
    /// values are clamped, never rejected.
    pub fn set_population(&mut self, region_id: &str, ratio: f32) -> Result<(), PressureError> {
        let handle = self.lookup(region_id)?;
        self.regions[handle.0].population = sanitize_f32(ratio, 0.0).clamp(0.0, 1.0);
        Ok(())
    }

    /// Advance one region by `dt` seconds, then run the attraction pass.
    /// The only mutating entry point besides `tick_all`.
    pub fn tick(
        &mut self,
        region_id: &str,
        delta_time: f64,
    ) -> Result<RegionPressureSnapshot, PressureError> {
        self.validate_dt(delta_time)?;
        let handle = self.lookup(region_id)?;
        self.advance_region(handle, delta_time);
        self.attraction_pass();
        Ok(self.regions[handle.0].snapshot())
    }

    /// Advance every region by `dt`, then run a single attraction pass
    /// over the fully updated pressures. This is the multi-region sync
    /// point: signal creation reads every region's combined pressure
    /// from the same tick.
    pub fn tick_all(&mut self, delta_time: f64) -> Result<Vec<RegionPressureSnapshot>, PressureError> {
        self.validate_dt(delta_time)?;
        for i in 0..self.regions.len() {
            self.advance_region(RegionHandle(i), delta_time);
        }
        self.attraction_pass();
        Ok(self.regions.iter().map(RegionState::snapshot).collect())
    }

    pub fn reset(&mut self, region_id: &str) -> Result<(), PressureError> {
        let handle = self.lookup(region_id)?;
        self.regions[handle.0].reset(self.cfg.history_retention);
        self.field.clear_involving(handle);
        Ok(())
    }

    pub fn reset_all(&mut self) {
        let retention = self.cfg.history_retention;
        for region in &mut self.regions {
            region.reset(retention);
        }
        self.field.clear();
        self.field_clock = 0.0;
    }

    fn validate_dt(&self, dt: f64) -> Result<(), PressureError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PressureError::InvalidDelta(dt));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_state(&self, region_id: &str) -> Result<RegionPressureSnapshot, PressureError> {
        let handle = self.lookup(region_id)?;
        Ok(self.regions[handle.0].snapshot())
    }

    pub fn highest_pressure_region(&self) -> Option<(&str, f32)> {
        self.regions
            .iter()
            .max_by(|a, b| a.combined.total_cmp(&b.combined))
            .map(|r| (r.id.as_str(), r.combined))
    }

    pub fn lowest_pressure_region(&self) -> Option<(&str, f32)> {
        self.regions
            .iter()
            .min_by(|a, b| a.combined.total_cmp(&b.combined))
            .map(|r| (r.id.as_str(), r.combined))
    }

    pub fn pressure_map(&self) -> HashMap<String, f32> {
        self.regions
            .iter()
            .map(|r| (r.id.clone(), r.combined))
            .collect()
    }

    pub fn attraction_signal_count(&self) -> usize {
        self.field.len()
    }

    // ------------------------------------------------------------------
    // Tick internals
    // ------------------------------------------------------------------

    fn advance_region(&mut self, handle: RegionHandle, dt: f64) {
        let cfg = &self.cfg;
        let r = &mut self.regions[handle.0];
        r.sim_time += dt;
        let now = r.sim_time;

        let raw_sdi = sanitize_f32(r.sdi_source.advance(r.population, now, dt), r.sdi);
        let raw_vdi = sanitize_f32(r.vdi_source.advance(r.population, now, dt), r.vdi_raw);
        r.sdi = raw_sdi;
        r.vdi_raw = raw_vdi;
        r.sdi_history.push(now, raw_sdi);
        r.vdi_history.push(now, raw_vdi);
        r.sdi_history.prune(now);
        r.vdi_history.prune(now);

        r.sdi_rate = r.sdi_history.rate_of_change(cfg.rate_window, now);
        // A spike is only detected from the unblocked state; while a
        // hold is live the sample point stays pinned to the spike that
        // opened it.
        if r.sdi_rate > cfg.spike_threshold && now >= r.vdi_blocked_until {
            r.last_sdi_spike = Some(now);
            r.vdi_blocked_until = now + cfg.block_duration;
            tracing::debug!(region = %r.id, rate = r.sdi_rate, "SDI spike, VDI hold engaged");
        }

        // Anti-sync: while blocked, publish the VDI as it stood at the
        // spike, never a live value.
        r.vdi_modulated = if now < r.vdi_blocked_until {
            r.last_sdi_spike
                .and_then(|t| r.vdi_history.value_at_or_before(t))
                .unwrap_or(raw_vdi)
        } else {
            raw_vdi
        };

        r.combined = cfg.sdi_weight * r.sdi + cfg.vdi_weight * r.vdi_modulated;

        r.trend = match (
            r.sdi_history.mean_of_last(cfg.trend_window),
            r.sdi_history.mean_of_previous(cfg.trend_window),
        ) {
            (Some(recent), Some(previous)) => {
                let diff = recent - previous;
                if diff > cfg.trend_threshold {
                    Trend::Rising
                } else if diff < -cfg.trend_threshold {
                    Trend::Falling
                } else {
                    Trend::Stable
                }
            }
            _ => Trend::Stable,
        };

        r.broadcasting = r.combined > cfg.attraction_threshold;
    }

    /// Decay the field up to the current simulated time, emit new
    /// signals from broadcasting regions toward calmer ones in range,
    /// and refresh every region's receiving total.
    fn attraction_pass(&mut self) {
        let now = self
            .regions
            .iter()
            .map(|r| r.sim_time)
            .fold(self.field_clock, f64::max);
        if now > self.field_clock {
            self.field.decay(now - self.field_clock);
            self.field_clock = now;
        }

        for source_idx in 0..self.regions.len() {
            if !self.regions[source_idx].broadcasting {
                continue;
            }
            let source = RegionHandle(source_idx);
            let (src_pos, src_combined) = {
                let s = &self.regions[source_idx];
                (s.position, s.combined)
            };
            for target_idx in 0..self.regions.len() {
                if target_idx == source_idx {
                    continue;
                }
                let target = RegionHandle(target_idx);
                let t = &self.regions[target_idx];
                if t.combined >= src_combined {
                    continue;
                }
                let dist = distance(src_pos, t.position);
                if dist > self.cfg.attraction_range {
                    continue;
                }
                if self.field.has_live(source, target) {
                    continue;
                }
                let falloff = 1.0 - dist / self.cfg.attraction_range;
                let strength = ((src_combined - t.combined) * falloff * 0.5).clamp(0.0, 1.0);
                if strength > 0.0 {
                    self.field.emit(source, target, strength);
                    tracing::debug!(
                        source = %self.regions[source_idx].id,
                        target = %self.regions[target_idx].id,
                        strength,
                        "Attraction signal emitted"
                    );
                }
            }
        }

        for (i, region) in self.regions.iter_mut().enumerate() {
            region.receiving_attraction = self.field.receiving(RegionHandle(i));
        }
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}
