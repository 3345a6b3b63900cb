// src/model.rs
//! Domain records shared by the pipeline, the scorer and the read API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::types::FetchedConditions;

pub type ResortId = Uuid;

/// Reference catalog entry. Read-only for the whole service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resort {
    pub id: ResortId,
    pub slug: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_base_m: Option<i32>,
    #[serde(default)]
    pub elevation_summit_m: Option<i32>,
    /// ISO 3166 alpha-2 code.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub subregion: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub ski_region: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
}

/// Forward-looking window for forecast-dependent sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Horizon {
    #[default]
    Now,
    ThreeDays,
    SevenDays,
    FourteenDays,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [
        Horizon::Now,
        Horizon::ThreeDays,
        Horizon::SevenDays,
        Horizon::FourteenDays,
    ];

    pub fn days(self) -> u8 {
        match self {
            Horizon::Now => 0,
            Horizon::ThreeDays => 3,
            Horizon::SevenDays => 7,
            Horizon::FourteenDays => 14,
        }
    }

    pub fn from_days(days: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.days() == days)
    }
}

impl TryFrom<u8> for Horizon {
    type Error = String;

    fn try_from(days: u8) -> Result<Self, Self::Error> {
        Horizon::from_days(days)
            .ok_or_else(|| format!("horizon_days must be one of 0, 3, 7, 14 (got {days})"))
    }
}

impl From<Horizon> for u8 {
    fn from(h: Horizon) -> u8 {
        h.days()
    }
}

/// One value per horizon. Used for tunables and for per-run score caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerHorizon<T> {
    pub now: T,
    pub three_days: T,
    pub seven_days: T,
    pub fourteen_days: T,
}

impl<T> PerHorizon<T> {
    pub fn get(&self, h: Horizon) -> &T {
        match h {
            Horizon::Now => &self.now,
            Horizon::ThreeDays => &self.three_days,
            Horizon::SevenDays => &self.seven_days,
            Horizon::FourteenDays => &self.fourteen_days,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Horizon) -> T) -> Self {
        Self {
            now: f(Horizon::Now),
            three_days: f(Horizon::ThreeDays),
            seven_days: f(Horizon::SevenDays),
            fourteen_days: f(Horizon::FourteenDays),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Horizon, &T)> {
        Horizon::ALL.into_iter().map(move |h| (h, self.get(h)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthSource {
    /// On-mountain weather station.
    Station,
    /// Gridded weather model.
    Model,
}

impl DepthSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DepthSource::Station => "station",
            DepthSource::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthReading {
    pub source: DepthSource,
    pub depth_cm: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    #[serde(default)]
    pub snowfall_cm: Option<f64>,
    #[serde(default)]
    pub temperature_max_c: Option<f64>,
    #[serde(default)]
    pub temperature_min_c: Option<f64>,
    #[serde(default)]
    pub wind_speed_max_kmh: Option<f64>,
    #[serde(default)]
    pub precipitation_probability_pct: Option<f64>,
    #[serde(default)]
    pub weather_code: Option<u16>,
    /// 0..=1, decays with distance from today.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

/// Raw metrics for one resort in one run. Superseded by the next run, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub fetched_at: DateTime<Utc>,
    /// Timestamp of the primary depth reading, when one exists.
    pub observed_at: Option<DateTime<Utc>>,
    pub base_depth_cm: Option<f64>,
    pub depth_source: Option<DepthSource>,
    pub secondary_depth_cm: Option<f64>,
    pub new_snow_24h_cm: Option<f64>,
    pub new_snow_72h_cm: Option<f64>,
    pub temperature_c: Option<f64>,
    pub avg_temp_72h_c: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub forecast_source: Option<String>,
    pub forecast: Vec<ForecastDay>,
}

impl MetricsSnapshot {
    /// Snapshot for a resort whose fetch failed: every metric is null.
    pub fn unavailable(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            observed_at: None,
            base_depth_cm: None,
            depth_source: None,
            secondary_depth_cm: None,
            new_snow_24h_cm: None,
            new_snow_72h_cm: None,
            temperature_c: None,
            avg_temp_72h_c: None,
            wind_speed_kmh: None,
            forecast_source: None,
            forecast: Vec::new(),
        }
    }

    /// Station readings win over model readings; the next other reading is kept
    /// as the secondary for cross-source checks.
    pub fn from_fetched(fetched: FetchedConditions, fetched_at: DateTime<Utc>) -> Self {
        let mut readings: Vec<DepthReading> = fetched
            .depth_readings
            .into_iter()
            .filter(|r| r.depth_cm.is_finite() && r.depth_cm >= 0.0)
            .collect();
        readings.sort_by_key(|r| match r.source {
            DepthSource::Station => 0u8,
            DepthSource::Model => 1,
        });
        let mut iter = readings.into_iter();
        let primary = iter.next();
        let secondary = iter.next();

        Self {
            fetched_at,
            observed_at: primary.as_ref().map(|r| r.observed_at),
            base_depth_cm: primary.as_ref().map(|r| r.depth_cm),
            depth_source: primary.as_ref().map(|r| r.source),
            secondary_depth_cm: secondary.map(|r| r.depth_cm),
            new_snow_24h_cm: finite(fetched.new_snow_24h_cm),
            new_snow_72h_cm: finite(fetched.new_snow_72h_cm),
            temperature_c: finite(fetched.temperature_c),
            avg_temp_72h_c: finite(fetched.avg_temp_72h_c),
            wind_speed_kmh: finite(fetched.wind_speed_kmh),
            forecast_source: fetched.forecast_source,
            forecast: fetched.forecast,
        }
    }

    /// Confidence is only meaningful when the run produced some data.
    pub fn has_any_metric(&self) -> bool {
        self.base_depth_cm.is_some()
            || self.new_snow_72h_cm.is_some()
            || self.temperature_c.is_some()
            || self.wind_speed_kmh.is_some()
            || !self.forecast.is_empty()
    }

    /// Forecast snowfall summed over the horizon window (today only for `Now`).
    /// Null when no forecast day in the window carries a value.
    pub fn forecast_snow_cm(&self, horizon: Horizon) -> Option<f64> {
        let window = usize::from(horizon.days().max(1));
        self.forecast
            .iter()
            .take(window)
            .filter_map(|d| finite(d.snowfall_cm))
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v.max(0.0)))
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}
