use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::curve::PopulationCurve;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub signal: SignalConfig,
    pub sdi: SdiConfig,
    pub vdi: VdiConfig,
    pub biome: BiomeConfig,
    pub pressure: PressureConfig,
}

impl VeilConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: VeilConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults
    /// with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VEIL_RISE_RATE") {
            if let Ok(n) = v.parse() {
                self.signal.rise_rate = n;
            }
        }
        if let Ok(v) = std::env::var("VEIL_FALL_RATE") {
            if let Ok(n) = v.parse() {
                self.signal.fall_rate = n;
            }
        }
        if let Ok(v) = std::env::var("VEIL_SPIKE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.pressure.spike_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("VEIL_ATTRACTION_RANGE") {
            if let Ok(n) = v.parse() {
                self.pressure.attraction_range = n;
            }
        }
    }
}

// ============================================================================
// Signal shaping
// ============================================================================

/// Shared shaping parameters for both discomfort signals.
///
/// Rates are fractions of the remaining gap closed per second; the rise
/// rate must exceed the fall rate so recovery is always slower than
/// escalation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rise_rate: f32,
    pub fall_rate: f32,
    /// How much of the raw factor sum feeds into the population target.
    pub feedback_gain: f32,
    /// Dead band for classifying the per-tick delta as rising/falling.
    pub delta_band: f32,
    pub floor: f32,
    pub operational_max: f32,
    pub population_curve: PopulationCurve,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rise_rate: 0.20,
            fall_rate: 0.08,
            feedback_gain: 0.5,
            delta_band: 0.05,
            floor: -1.0,
            operational_max: 0.8,
            population_curve: PopulationCurve::default(),
        }
    }
}

// ============================================================================
// Audio factor catalogue
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SdiConfig {
    pub discomfort_weights: DiscomfortWeights,
    pub discomfort_caps: DiscomfortCaps,
    pub comfort_weights: ComfortWeights,
    pub comfort_floors: ComfortFloors,
    pub conflict_pairs: Vec<SoundPair>,
    pub harmony_pairs: Vec<SoundPair>,
    pub tag_conflicts: Vec<TagPair>,
    pub tag_harmonies: Vec<TagPair>,
    /// Window for counting appropriate silence gaps, seconds.
    pub silence_comfort_window: f64,
    /// Linear decay time for broken-pattern contributions, seconds.
    pub break_decay_time: f64,
}

impl Default for SdiConfig {
    fn default() -> Self {
        Self {
            discomfort_weights: DiscomfortWeights::default(),
            discomfort_caps: DiscomfortCaps::default(),
            comfort_weights: ComfortWeights::default(),
            comfort_floors: ComfortFloors::default(),
            conflict_pairs: Vec::new(),
            harmony_pairs: Vec::new(),
            tag_conflicts: Vec::new(),
            tag_harmonies: Vec::new(),
            silence_comfort_window: 60.0,
            break_decay_time: 30.0,
        }
    }
}

/// Positive factor weights. Each factor contributes `weight × magnitude`,
/// clamped to its cap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscomfortWeights {
    pub density_overload: f32,
    pub layer_conflict: f32,
    pub rhythm_instability: f32,
    pub silence_deprivation: f32,
    pub persistence: f32,
    pub absence_after_pattern: f32,
}

impl Default for DiscomfortWeights {
    fn default() -> Self {
        Self {
            density_overload: 0.15,
            layer_conflict: 0.25,
            rhythm_instability: 0.10,
            silence_deprivation: 0.08,
            persistence: 0.05,
            absence_after_pattern: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscomfortCaps {
    pub density_overload: f32,
    pub layer_conflict: f32,
    pub rhythm_instability: f32,
    pub silence_deprivation: f32,
    pub persistence: f32,
    pub absence_after_pattern: f32,
}

impl Default for DiscomfortCaps {
    fn default() -> Self {
        Self {
            density_overload: 0.45,
            layer_conflict: 0.50,
            rhythm_instability: 0.30,
            silence_deprivation: 0.40,
            persistence: 0.30,
            absence_after_pattern: 0.30,
        }
    }
}

/// Negative factor weights (stored as negative values).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComfortWeights {
    pub predictable_rhythm: f32,
    pub appropriate_silence: f32,
    pub layer_harmony: f32,
    pub gradual_transition: f32,
    pub resolution: f32,
    pub environmental_coherence: f32,
}

impl Default for ComfortWeights {
    fn default() -> Self {
        Self {
            predictable_rhythm: -0.10,
            appropriate_silence: -0.05,
            layer_harmony: -0.08,
            gradual_transition: -0.10,
            resolution: -0.15,
            environmental_coherence: -0.05,
        }
    }
}

/// Most-negative allowed value per comfort factor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComfortFloors {
    pub predictable_rhythm: f32,
    pub appropriate_silence: f32,
    pub layer_harmony: f32,
    pub gradual_transition: f32,
    pub resolution: f32,
    pub environmental_coherence: f32,
}

impl Default for ComfortFloors {
    fn default() -> Self {
        Self {
            predictable_rhythm: -0.30,
            appropriate_silence: -0.20,
            layer_harmony: -0.30,
            gradual_transition: -0.20,
            resolution: -0.25,
            environmental_coherence: -0.10,
        }
    }
}

/// A pair of sound ids that conflict or harmonize when simultaneously
/// active.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoundPair {
    pub sound_a: String,
    pub sound_b: String,
    #[serde(default)]
    pub strength: PairStrength,
}

/// A pair of tags that conflict or harmonize when both present among
/// active events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagPair {
    pub tag_a: String,
    pub tag_b: String,
    #[serde(default)]
    pub strength: PairStrength,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrength {
    Weak,
    #[default]
    Medium,
    Strong,
}

impl PairStrength {
    pub fn multiplier(self) -> f32 {
        match self {
            PairStrength::Weak => 0.5,
            PairStrength::Medium => 1.0,
            PairStrength::Strong => 1.5,
        }
    }
}

// ============================================================================
// Visual factor catalogue
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VdiConfig {
    pub visual_density: f32,
    pub environmental_wear: f32,
    pub wildlife_absence: f32,
    pub motion_incoherence: f32,
    pub wildlife_presence: f32,
    pub visual_clarity: f32,
    pub motion_coherence: f32,
    /// Wear accumulates above this population ratio, recovers below it.
    pub wear_threshold: f32,
    pub wear_build_rate: f32,
    pub wear_decay_rate: f32,
    /// Wildlife flees above this population ratio, returns below it.
    pub wildlife_threshold: f32,
    pub wildlife_flee_rate: f32,
    pub wildlife_return_rate: f32,
    /// Element motion desynchronizes above this population ratio.
    pub motion_threshold: f32,
    /// Fraction of the sync gap closed per second.
    pub motion_smoothing: f32,
}

impl Default for VdiConfig {
    fn default() -> Self {
        Self {
            visual_density: 0.12,
            environmental_wear: 0.08,
            wildlife_absence: 0.12,
            motion_incoherence: 0.15,
            wildlife_presence: -0.15,
            visual_clarity: -0.10,
            motion_coherence: -0.12,
            wear_threshold: 0.5,
            wear_build_rate: 0.02,
            wear_decay_rate: 0.005,
            wildlife_threshold: 0.4,
            wildlife_flee_rate: 0.10,
            wildlife_return_rate: 0.02,
            motion_threshold: 0.35,
            motion_smoothing: 0.05,
        }
    }
}

// ============================================================================
// Biome parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BiomeConfig {
    /// Constant offset applied to the raw audio signal.
    pub baseline: f32,
    /// Simultaneous sounds a layer tolerates before density overload.
    pub layer_capacity: usize,
    /// Seconds without silence before deprivation sets in.
    pub silence_tolerance: f64,
    /// Sound ids considered native to the biome; an empty pool disables
    /// coherence checking.
    pub sound_pool: Vec<String>,
}

impl Default for BiomeConfig {
    fn default() -> Self {
        Self {
            baseline: 0.0,
            layer_capacity: 4,
            silence_tolerance: 5.0,
            sound_pool: Vec::new(),
        }
    }
}

// ============================================================================
// Coordinator parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Window for the SDI rate-of-change estimate, seconds.
    pub rate_window: f64,
    /// Rate above which an SDI spike is recorded, units per second.
    pub spike_threshold: f32,
    /// How long a spike blocks live VDI, seconds.
    pub block_duration: f64,
    pub sdi_weight: f32,
    pub vdi_weight: f32,
    /// Samples per half of the trend comparison.
    pub trend_window: usize,
    pub trend_threshold: f32,
    pub attraction_threshold: f32,
    /// Maximum distance over which attraction propagates, world units.
    pub attraction_range: f32,
    /// Lifetime of an attraction signal, seconds.
    pub attraction_duration: f64,
    pub history_retention: f64,
    pub max_attraction_signals: usize,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            rate_window: 2.0,
            spike_threshold: 0.15,
            block_duration: 5.0,
            sdi_weight: 0.55,
            vdi_weight: 0.45,
            trend_window: 10,
            trend_threshold: 0.05,
            attraction_threshold: 0.35,
            attraction_range: 500.0,
            attraction_duration: 30.0,
            history_retention: 30.0,
            max_attraction_signals: 64,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
