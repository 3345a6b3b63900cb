// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{DepthReading, ForecastDay, Resort};

/// What a provider returns for one resort. Every metric is optional.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FetchedConditions {
    #[serde(default)]
    pub depth_readings: Vec<DepthReading>,
    #[serde(default)]
    pub new_snow_24h_cm: Option<f64>,
    #[serde(default)]
    pub new_snow_72h_cm: Option<f64>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub avg_temp_72h_c: Option<f64>,
    #[serde(default)]
    pub wind_speed_kmh: Option<f64>,
    #[serde(default)]
    pub forecast_source: Option<String>,
    #[serde(default)]
    pub forecast: Vec<ForecastDay>,
}

#[async_trait::async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Conditions as of `now`, the run's reference instant. Observations after
    /// it are not counted.
    async fn fetch(&self, resort: &Resort, now: DateTime<Utc>) -> Result<FetchedConditions>;
    fn name(&self) -> &'static str;
}
