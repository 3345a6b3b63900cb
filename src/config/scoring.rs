// src/config/scoring.rs
//! Every scoring and quality tunable in one validated struct.
//!
//! TOML shape (all sections optional, missing ones take defaults):
//! ```toml
//! [divisors]
//! base_depth_cm = 200.0
//! fresh_snow_72h_cm = 50.0
//! [divisors.forecast_snow_cm]
//! now = 10.0
//! three_days = 30.0
//! seven_days = 60.0
//! fourteen_days = 100.0
//!
//! [weights]
//! base_depth = 0.25
//! fresh_snow = 0.35
//! temperature = 0.20
//! wind = 0.10
//! forecast = 0.10
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Horizon, PerHorizon};
use crate::scoring::composite::Weights;

pub const DEFAULT_SCORING_CONFIG_PATH: &str = "config/scoring.toml";
pub const ENV_SCORING_CONFIG_PATH: &str = "SKIRANK_SCORING_CONFIG";
/// No override may expire on less new snow than this, whatever the config says.
pub const OVERRIDE_THRESHOLD_FLOOR_CM: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub divisors: Divisors,
    pub temperature_curve: Vec<CurvePoint>,
    pub wind: WindBands,
    pub forecast_confidence_curve: Vec<CurvePoint>,
    pub horizon_mix: PerHorizon<HorizonMix>,
    pub weights: Weights,
    pub freshness: FreshnessConfig,
    pub overrides: OverrideDefaults,
    pub plausibility: PlausibilityConfig,
}

/// Reference magnitudes that score 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Divisors {
    pub base_depth_cm: f64,
    pub fresh_snow_72h_cm: f64,
    pub forecast_snow_cm: PerHorizon<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindBand {
    pub below_kmh: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindBands {
    pub bands: Vec<WindBand>,
    /// Score at and above the last band ("lifts closed").
    pub closed_score: f64,
}

/// Share of observed vs. forecast signal at a horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMix {
    pub current: f64,
    pub forecast: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub informational_after_hours: i64,
    pub stale_after_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideDefaults {
    pub default_threshold_cm: f64,
    pub min_threshold_cm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationCap {
    pub up_to_m: i32,
    pub max_depth_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibilityConfig {
    pub offseason_max_depth_cm: f64,
    pub elevation_caps: Vec<ElevationCap>,
    /// Cap above the highest `up_to_m` entry.
    pub elevation_cap_above_cm: f64,
    pub max_unexplained_gain_cm: f64,
    /// Fraction of the gain that 24h snowfall must explain.
    pub min_snowfall_explained_ratio: f64,
    pub max_loss_cm: f64,
    pub cross_source_max_ratio: f64,
    pub warm_temp_c: f64,
    pub warm_max_depth_cm: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            divisors: Divisors::default(),
            temperature_curve: vec![
                CurvePoint { x: -40.0, score: 40.0 },
                CurvePoint { x: -25.0, score: 70.0 },
                CurvePoint { x: -15.0, score: 100.0 },
                CurvePoint { x: -5.0, score: 100.0 },
                CurvePoint { x: 0.0, score: 45.0 },
                CurvePoint { x: 2.0, score: 0.0 },
            ],
            wind: WindBands::default(),
            forecast_confidence_curve: vec![
                CurvePoint { x: 0.0, score: 100.0 },
                CurvePoint { x: 3.0, score: 80.0 },
                CurvePoint { x: 7.0, score: 55.0 },
                CurvePoint { x: 14.0, score: 20.0 },
            ],
            horizon_mix: PerHorizon {
                now: HorizonMix { current: 1.0, forecast: 0.0 },
                three_days: HorizonMix { current: 0.6, forecast: 0.4 },
                seven_days: HorizonMix { current: 0.3, forecast: 0.7 },
                fourteen_days: HorizonMix { current: 0.1, forecast: 0.9 },
            },
            weights: Weights::default(),
            freshness: FreshnessConfig::default(),
            overrides: OverrideDefaults::default(),
            plausibility: PlausibilityConfig::default(),
        }
    }
}

impl Default for Divisors {
    fn default() -> Self {
        Self {
            base_depth_cm: 200.0,
            fresh_snow_72h_cm: 50.0,
            forecast_snow_cm: PerHorizon {
                now: 10.0,
                three_days: 30.0,
                seven_days: 60.0,
                fourteen_days: 100.0,
            },
        }
    }
}

impl Default for WindBands {
    fn default() -> Self {
        Self {
            bands: vec![
                WindBand { below_kmh: 20.0, score: 100.0 },
                WindBand { below_kmh: 40.0, score: 80.0 },
                WindBand { below_kmh: 60.0, score: 50.0 },
                WindBand { below_kmh: 80.0, score: 20.0 },
            ],
            closed_score: 0.0,
        }
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            informational_after_hours: 24,
            stale_after_hours: 48,
        }
    }
}

impl Default for OverrideDefaults {
    fn default() -> Self {
        Self {
            default_threshold_cm: 20.0,
            min_threshold_cm: 5.0,
        }
    }
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        Self {
            offseason_max_depth_cm: 50.0,
            elevation_caps: vec![
                ElevationCap { up_to_m: 1500, max_depth_cm: 250.0 },
                ElevationCap { up_to_m: 2000, max_depth_cm: 350.0 },
                ElevationCap { up_to_m: 2500, max_depth_cm: 450.0 },
                ElevationCap { up_to_m: 3000, max_depth_cm: 550.0 },
            ],
            elevation_cap_above_cm: 700.0,
            max_unexplained_gain_cm: 30.0,
            min_snowfall_explained_ratio: 0.5,
            max_loss_cm: 60.0,
            cross_source_max_ratio: 3.0,
            warm_temp_c: 3.0,
            warm_max_depth_cm: 150.0,
        }
    }
}

impl ScoringConfig {
    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ScoringConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks:
    /// 1) $SKIRANK_SCORING_CONFIG
    /// 2) config/scoring.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_SCORING_CONFIG_PATH) {
            return Self::from_path(&PathBuf::from(p));
        }
        let default_path = PathBuf::from(DEFAULT_SCORING_CONFIG_PATH);
        if default_path.exists() {
            return Self::from_path(&default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("divisors.base_depth_cm", self.divisors.base_depth_cm)?;
        positive("divisors.fresh_snow_72h_cm", self.divisors.fresh_snow_72h_cm)?;
        for (_, d) in self.divisors.forecast_snow_cm.iter() {
            positive("divisors.forecast_snow_cm", *d)?;
        }

        validate_curve("temperature_curve", &self.temperature_curve)?;
        validate_single_peak("temperature_curve", &self.temperature_curve)?;
        validate_curve("forecast_confidence_curve", &self.forecast_confidence_curve)?;
        if !self
            .forecast_confidence_curve
            .windows(2)
            .all(|w| w[0].score >= w[1].score)
        {
            return Err(ConfigError::InvalidCurve {
                name: "forecast_confidence_curve",
                reason: "confidence must not rise with lead time".into(),
            });
        }
        self.wind.validate()?;

        for (h, mix) in self.horizon_mix.iter() {
            let sum = mix.current + mix.forecast;
            if mix.current < 0.0 || mix.forecast < 0.0 || (sum - 1.0).abs() > 1e-6 {
                return Err(ConfigError::InvalidHorizonMix { days: h.days(), sum });
            }
        }
        if self.horizon_mix.get(Horizon::Now).forecast != 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "horizon_mix.now",
                reason: "the 0-day horizon cannot draw on forecast snow".into(),
            });
        }

        self.weights.validate()?;

        let f = &self.freshness;
        if f.informational_after_hours <= 0 || f.stale_after_hours <= f.informational_after_hours {
            return Err(ConfigError::OutOfRange {
                name: "freshness",
                reason: format!(
                    "need 0 < informational_after_hours ({}) < stale_after_hours ({})",
                    f.informational_after_hours, f.stale_after_hours
                ),
            });
        }

        let o = &self.overrides;
        if !(o.min_threshold_cm >= OVERRIDE_THRESHOLD_FLOOR_CM)
            || !(o.default_threshold_cm >= o.min_threshold_cm)
        {
            return Err(ConfigError::OutOfRange {
                name: "overrides",
                reason: format!(
                    "need {OVERRIDE_THRESHOLD_FLOOR_CM} <= min_threshold_cm ({}) <= default_threshold_cm ({})",
                    o.min_threshold_cm, o.default_threshold_cm
                ),
            });
        }

        let p = &self.plausibility;
        if !p.elevation_caps.windows(2).all(|w| w[0].up_to_m < w[1].up_to_m) {
            return Err(ConfigError::OutOfRange {
                name: "plausibility.elevation_caps",
                reason: "up_to_m must be strictly increasing".into(),
            });
        }
        if !(p.cross_source_max_ratio >= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "plausibility.cross_source_max_ratio",
                reason: format!("must be at least 1 (got {})", p.cross_source_max_ratio),
            });
        }
        Ok(())
    }
}

impl WindBands {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::InvalidWindBands("at least one band is required".into()));
        }
        if self.bands.iter().any(|b| !in_score_range(b.score)) || !in_score_range(self.closed_score) {
            return Err(ConfigError::InvalidWindBands("scores must lie within 0..=100".into()));
        }
        for w in self.bands.windows(2) {
            if !(w[0].below_kmh < w[1].below_kmh) {
                return Err(ConfigError::InvalidWindBands(format!(
                    "band bounds must increase ({} then {})",
                    w[0].below_kmh, w[1].below_kmh
                )));
            }
            if !(w[0].score > w[1].score) {
                return Err(ConfigError::InvalidWindBands(format!(
                    "band scores must strictly decrease ({} then {})",
                    w[0].score, w[1].score
                )));
            }
        }
        let last = self.bands.last().map(|b| b.score).unwrap_or_default();
        if !(last > self.closed_score) {
            return Err(ConfigError::InvalidWindBands(
                "closed_score must be below the last band".into(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDivisor { name, value })
    }
}

fn in_score_range(v: f64) -> bool {
    (0.0..=100.0).contains(&v)
}

fn validate_curve(name: &'static str, points: &[CurvePoint]) -> Result<(), ConfigError> {
    if points.len() < 2 {
        return Err(ConfigError::InvalidCurve {
            name,
            reason: "needs at least two points".into(),
        });
    }
    if points.iter().any(|p| !p.x.is_finite() || !in_score_range(p.score)) {
        return Err(ConfigError::InvalidCurve {
            name,
            reason: "points need finite x and a score within 0..=100".into(),
        });
    }
    if !points.windows(2).all(|w| w[0].x < w[1].x) {
        return Err(ConfigError::InvalidCurve {
            name,
            reason: "x values must be strictly increasing".into(),
        });
    }
    Ok(())
}

/// Scores rise (or hold) up to the first maximum and fall (or hold) after it.
fn validate_single_peak(name: &'static str, points: &[CurvePoint]) -> Result<(), ConfigError> {
    let peak = points
        .iter()
        .enumerate()
        .fold(0, |best, (i, p)| if p.score > points[best].score { i } else { best });
    let rising = points[..=peak].windows(2).all(|w| w[0].score <= w[1].score);
    let falling = points[peak..].windows(2).all(|w| w[0].score >= w[1].score);
    if rising && falling {
        Ok(())
    } else {
        Err(ConfigError::InvalidCurve {
            name,
            reason: format!(
                "scores must rise to the peak at x={} and fall after it",
                points[peak].x
            ),
        })
    }
}
