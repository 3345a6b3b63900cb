// src/ingest/providers/open_meteo.rs
//! Gridded model data from the Open-Meteo forecast API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;

use crate::ingest::retry::{self, INITIAL_BACKOFF};
use crate::ingest::types::{FetchedConditions, MetricsProvider};
use crate::model::{DepthReading, DepthSource, ForecastDay, Resort};

const HOURLY_VARS: &str = "snow_depth,snowfall,temperature_2m,windspeed_10m";
const DAILY_VARS: &str = "snowfall_sum,temperature_2m_max,temperature_2m_min,windspeed_10m_max,precipitation_probability_max,weathercode";
const FORECAST_DAYS: u32 = 16;
const PAST_DAYS: u32 = 3;
const SOURCE_NAME: &str = "open_meteo";

#[derive(Debug, Default, Deserialize)]
struct Hourly {
    #[serde(default)]
    time: Vec<i64>,
    #[serde(default)]
    snow_depth: Vec<Option<f64>>,
    #[serde(default)]
    snowfall: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Daily {
    #[serde(default)]
    time: Vec<i64>,
    #[serde(default)]
    snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    hourly: Hourly,
    #[serde(default)]
    daily: Daily,
}

fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten().filter(|v| v.is_finite())
}

/// `max(0.1, 1 - d/16 * 0.5)`: forecasts lose trust with distance.
pub fn day_confidence(distance_days: usize) -> f64 {
    (1.0 - distance_days as f64 / f64::from(FORECAST_DAYS) * 0.5).max(0.1)
}

/// Reduce a raw response to per-resort conditions as of `now`.
/// Only hours at or before `now` count as observed.
pub fn reduce_response(resp: ForecastResponse, now: DateTime<Utc>) -> FetchedConditions {
    let h = &resp.hourly;
    let now_ts = now.timestamp();
    let observed: Vec<usize> = h
        .time
        .iter()
        .enumerate()
        .filter(|(_, t)| **t <= now_ts)
        .map(|(i, _)| i)
        .collect();

    let depth_reading = observed.iter().rev().find_map(|&i| {
        let depth_m = at(&h.snow_depth, i)?;
        let observed_at = DateTime::from_timestamp(*h.time.get(i)?, 0)?;
        Some(DepthReading {
            source: DepthSource::Model,
            depth_cm: (depth_m * 1000.0).round() / 10.0,
            observed_at,
        })
    });

    let window = |hours: i64| -> Vec<usize> {
        observed
            .iter()
            .copied()
            .filter(|&i| h.time.get(i).is_some_and(|t| now_ts - t < hours * 3600))
            .collect()
    };
    let sum_over = |idx: &[usize], series: &[Option<f64>]| -> Option<f64> {
        idx.iter()
            .filter_map(|&i| at(series, i))
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v.max(0.0)))
    };
    let last_24 = window(24);
    let last_72 = window(72);

    let temperature_c = observed.iter().rev().find_map(|&i| at(&h.temperature_2m, i));
    let temps_72: Vec<f64> = last_72.iter().filter_map(|&i| at(&h.temperature_2m, i)).collect();
    let avg_temp_72h_c =
        (!temps_72.is_empty()).then(|| temps_72.iter().sum::<f64>() / temps_72.len() as f64);

    let d = &resp.daily;
    let wind_speed_kmh = last_24
        .iter()
        .filter_map(|&i| at(&h.windspeed_10m, i))
        .reduce(f64::max)
        .or_else(|| at(&d.windspeed_10m_max, 0));

    let today = now.date_naive();
    let forecast: Vec<ForecastDay> = d
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            (date >= today).then_some((i, date))
        })
        .enumerate()
        .map(|(distance, (i, date))| ForecastDay {
            date,
            snowfall_cm: at(&d.snowfall_sum, i),
            temperature_max_c: at(&d.temperature_2m_max, i),
            temperature_min_c: at(&d.temperature_2m_min, i),
            wind_speed_max_kmh: at(&d.windspeed_10m_max, i),
            precipitation_probability_pct: at(&d.precipitation_probability_max, i),
            weather_code: at(&d.weathercode, i).map(|c| c as u16),
            confidence: day_confidence(distance),
        })
        .collect();

    FetchedConditions {
        depth_readings: depth_reading.into_iter().collect(),
        new_snow_24h_cm: sum_over(&last_24, &h.snowfall),
        new_snow_72h_cm: sum_over(&last_72, &h.snowfall),
        temperature_c,
        avg_temp_72h_c,
        wind_speed_kmh,
        forecast_source: (!forecast.is_empty()).then(|| SOURCE_NAME.to_string()),
        forecast,
    }
}

pub struct OpenMeteoProvider {
    client: reqwest::Client,
    base_url: String,
    backoff: Duration,
}

impl OpenMeteoProvider {
    /// `timeout` bounds each attempt; callers wrapping a whole fetch should
    /// allow `retry::retry_budget(timeout)`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skirank/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building open-meteo http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            backoff: INITIAL_BACKOFF,
        })
    }

    async fn get_once(&self, resort: &Resort) -> Result<ForecastResponse> {
        let url = format!("{}/v1/forecast", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("latitude", resort.latitude.to_string()),
                ("longitude", resort.longitude.to_string()),
                ("hourly", HOURLY_VARS.to_string()),
                ("daily", DAILY_VARS.to_string()),
                ("past_days", PAST_DAYS.to_string()),
                ("forecast_days", FORECAST_DAYS.to_string()),
                ("timezone", "UTC".to_string()),
                ("timeformat", "unixtime".to_string()),
            ])
            .send()
            .await
            .context("open-meteo get()")?
            .error_for_status()
            .context("open-meteo status")?;
        resp.json::<ForecastResponse>()
            .await
            .context("decoding open-meteo json")
    }
}

#[async_trait]
impl MetricsProvider for OpenMeteoProvider {
    async fn fetch(&self, resort: &Resort, now: DateTime<Utc>) -> Result<FetchedConditions> {
        let t0 = std::time::Instant::now();
        let body = retry::with_retries(SOURCE_NAME, &resort.slug, self.backoff, || {
            self.get_once(resort)
        })
        .await?;
        histogram!("provider_fetch_ms", "source" => SOURCE_NAME)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(reduce_response(body, now))
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}
