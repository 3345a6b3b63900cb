// src/ingest/providers/synoptic.rs
//! On-mountain snow depth from the Synoptic Data timeseries API.
//!
//! Synoptic aggregates SNOTEL, SCAN and other station networks. Resorts are
//! mapped to a station id (`stid`) in `data/resort_station_map.json`; mapped
//! resorts get the station's latest depth as a `Station` reading next to the
//! gridded provider's `Model` reading, so the quality classifier can verify it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::ingest::retry::{self, INITIAL_BACKOFF};
use crate::ingest::types::{FetchedConditions, MetricsProvider};
use crate::model::{DepthReading, DepthSource, Resort};

const SOURCE_NAME: &str = "synoptic";
/// Three days back, to ride out station reporting lag.
const RECENT_MINUTES: u32 = 4320;
const DEFAULT_DEPTH_UNIT: &str = "Meters";

#[derive(Debug, Default, Deserialize)]
pub struct TimeseriesResponse {
    #[serde(rename = "STATION", default)]
    stations: Vec<StationSeries>,
    #[serde(rename = "UNITS", default)]
    units: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct StationSeries {
    #[serde(rename = "STID", default)]
    stid: String,
    /// `date_time` plus one `snow_depth_set_N` array per sensor set.
    #[serde(rename = "OBSERVATIONS", default)]
    observations: BTreeMap<String, serde_json::Value>,
}

/// Centimetres from a reading in `unit`, rounded to 0.1. `None` for units we
/// do not recognise.
pub fn depth_to_cm(value: f64, unit: &str) -> Option<f64> {
    let u = unit.trim().to_ascii_lowercase();
    let cm = if u == "mm" || u.contains("millimeter") {
        value / 10.0
    } else if u == "cm" || u.contains("centimeter") {
        value
    } else if u == "m" || u.contains("meter") {
        value * 100.0
    } else if u == "in" || u.contains("inch") {
        value * 2.54
    } else {
        return None;
    };
    Some((cm * 10.0).round() / 10.0)
}

/// Latest non-null depth for `stid` observed at or before `now`.
pub fn latest_depth(
    resp: &TimeseriesResponse,
    stid: &str,
    now: DateTime<Utc>,
) -> Option<DepthReading> {
    let unit = resp
        .units
        .get("snow_depth")
        .map(String::as_str)
        .unwrap_or(DEFAULT_DEPTH_UNIT);
    let station = resp.stations.iter().find(|s| s.stid.eq_ignore_ascii_case(stid))?;
    let obs = &station.observations;
    let depths = obs
        .iter()
        .find(|(k, _)| k.starts_with("snow_depth"))
        .and_then(|(_, v)| v.as_array())?;
    let times = obs.get("date_time").and_then(|v| v.as_array())?;

    depths.iter().zip(times).rev().find_map(|(depth, ts)| {
        let raw = depth.as_f64().filter(|v| v.is_finite() && *v >= 0.0)?;
        let observed_at = DateTime::parse_from_rfc3339(ts.as_str()?)
            .ok()?
            .with_timezone(&Utc);
        if observed_at > now {
            return None;
        }
        let Some(depth_cm) = depth_to_cm(raw, unit) else {
            tracing::warn!(target: "ingest", stid, unit, "unknown snow_depth unit, reading skipped");
            return None;
        };
        Some(DepthReading {
            source: DepthSource::Station,
            depth_cm,
            observed_at,
        })
    })
}

/// Resort slug to station id, as built offline from station metadata.
#[derive(Debug, Clone, Default)]
pub struct StationMap {
    by_slug: HashMap<String, MappedStation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappedStation {
    pub stid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl StationMap {
    /// `{ "<slug>": { "stid": "...", ... } }`
    pub fn from_json_str(s: &str) -> Result<Self> {
        let by_slug = serde_json::from_str(s).context("parsing station map")?;
        Ok(Self { by_slug })
    }

    /// A missing file is an empty map: stations are optional.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_json_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "ingest",
                    path = %path.display(),
                    "station map not found, station depths disabled"
                );
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading station map {}", path.display())),
        }
    }

    pub fn stid_for(&self, slug: &str) -> Option<&str> {
        self.by_slug.get(slug).map(|s| s.stid.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }
}

/// Where station depths come from. `Ok(None)` means the station has nothing
/// recent, which is not an error.
#[async_trait]
pub trait StationSource: Send + Sync {
    async fn latest_depth(&self, stid: &str, now: DateTime<Utc>) -> Result<Option<DepthReading>>;
}

pub struct SynopticClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    backoff: Duration,
}

impl SynopticClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skirank/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building synoptic http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            backoff: INITIAL_BACKOFF,
        })
    }

    async fn get_once(&self, stid: &str) -> Result<TimeseriesResponse> {
        let url = format!("{}/stations/timeseries", self.base_url);
        let recent = RECENT_MINUTES.to_string();
        // the token rides in the query string; keep it out of error messages
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("token", self.token.as_str()),
                ("stid", stid),
                ("recent", recent.as_str()),
                ("vars", "snow_depth"),
                ("units", "metric"),
                ("output", "json"),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("synoptic get()")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("synoptic status")?;
        resp.json::<TimeseriesResponse>()
            .await
            .map_err(reqwest::Error::without_url)
            .context("decoding synoptic json")
    }
}

#[async_trait]
impl StationSource for SynopticClient {
    async fn latest_depth(&self, stid: &str, now: DateTime<Utc>) -> Result<Option<DepthReading>> {
        let t0 = std::time::Instant::now();
        let body =
            retry::with_retries(SOURCE_NAME, stid, self.backoff, || self.get_once(stid)).await?;
        histogram!("provider_fetch_ms", "source" => SOURCE_NAME)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(latest_depth(&body, stid, now))
    }
}

/// Wraps a gridded provider and adds a station depth for mapped resorts. The
/// two lookups run concurrently; a station failure only costs the reading.
pub struct StationEnrichedProvider {
    primary: Arc<dyn MetricsProvider>,
    stations: Arc<dyn StationSource>,
    map: StationMap,
}

impl StationEnrichedProvider {
    pub fn new(
        primary: Arc<dyn MetricsProvider>,
        stations: Arc<dyn StationSource>,
        map: StationMap,
    ) -> Self {
        Self {
            primary,
            stations,
            map,
        }
    }
}

#[async_trait]
impl MetricsProvider for StationEnrichedProvider {
    async fn fetch(&self, resort: &Resort, now: DateTime<Utc>) -> Result<FetchedConditions> {
        let Some(stid) = self.map.stid_for(&resort.slug) else {
            return self.primary.fetch(resort, now).await;
        };
        let (primary, station) = tokio::join!(
            self.primary.fetch(resort, now),
            self.stations.latest_depth(stid, now)
        );
        let mut conditions = primary?;
        match station {
            Ok(Some(reading)) => {
                counter!("station_depth_lookups_total", "outcome" => "reading").increment(1);
                tracing::debug!(
                    target: "ingest",
                    resort = %resort.slug,
                    stid,
                    depth_cm = reading.depth_cm,
                    "station depth merged"
                );
                conditions.depth_readings.push(reading);
            }
            Ok(None) => {
                counter!("station_depth_lookups_total", "outcome" => "no_data").increment(1);
                tracing::debug!(target: "ingest", resort = %resort.slug, stid, "no recent station depth");
            }
            Err(e) => {
                counter!("station_depth_lookups_total", "outcome" => "error").increment(1);
                tracing::warn!(
                    target: "ingest",
                    resort = %resort.slug,
                    stid,
                    error = ?e,
                    "station depth lookup failed, keeping model depth"
                );
            }
        }
        Ok(conditions)
    }

    fn name(&self) -> &'static str {
        "station_enriched"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 6, 0, 0).unwrap()
    }

    fn response(json: serde_json::Value) -> TimeseriesResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn units_convert_to_centimetres() {
        assert_eq!(depth_to_cm(1.85, "Meters"), Some(185.0));
        assert_eq!(depth_to_cm(1234.0, "Millimeters"), Some(123.4));
        assert_eq!(depth_to_cm(40.0, "Inches"), Some(101.6));
        assert_eq!(depth_to_cm(77.0, "cm"), Some(77.0));
        assert_eq!(depth_to_cm(3.0, "furlongs"), None);
    }

    #[test]
    fn walks_back_to_the_latest_non_null_reading() {
        let resp = response(serde_json::json!({
            "UNITS": { "snow_depth": "Millimeters" },
            "STATION": [
                { "STID": "OTHER", "OBSERVATIONS": {
                    "date_time": ["2025-02-10T05:00:00Z"],
                    "snow_depth_set_1": [9999.0]
                }},
                { "STID": "TGN01", "OBSERVATIONS": {
                    "date_time": [
                        "2025-02-10T03:00:00Z",
                        "2025-02-10T04:00:00Z",
                        "2025-02-10T05:00:00Z",
                        "2025-02-10T07:00:00Z"
                    ],
                    "snow_depth_set_1": [1800.0, 1850.0, null, 1900.0]
                }}
            ]
        }));
        let r = latest_depth(&resp, "TGN01", now()).unwrap();
        // 07:00 is after the run instant, 05:00 is null
        assert_eq!(r.depth_cm, 185.0);
        assert_eq!(r.source, DepthSource::Station);
        assert_eq!(r.observed_at, Utc.with_ymd_and_hms(2025, 2, 10, 4, 0, 0).unwrap());
    }

    #[test]
    fn missing_station_or_series_yields_nothing() {
        let empty = TimeseriesResponse::default();
        assert!(latest_depth(&empty, "TGN01", now()).is_none());

        let no_depth = response(serde_json::json!({
            "STATION": [{ "STID": "TGN01", "OBSERVATIONS": {
                "date_time": ["2025-02-10T05:00:00Z"],
                "air_temp_set_1": [-4.0]
            }}]
        }));
        assert!(latest_depth(&no_depth, "TGN01", now()).is_none());

        // default unit is meters
        let meters = response(serde_json::json!({
            "STATION": [{ "STID": "TGN01", "OBSERVATIONS": {
                "date_time": ["2025-02-10T05:00:00Z", "2025-02-10T06:00:00Z"],
                "snow_depth_set_1": [null, 1.5]
            }}]
        }));
        assert_eq!(latest_depth(&meters, "TGN01", now()).unwrap().depth_cm, 150.0);
    }

    #[test]
    fn station_map_reads_slug_to_stid() {
        let map = StationMap::from_json_str(
            r#"{ "vail": { "stid": "VAIL1", "name": "Vail Mountain", "distance_km": 2.4 } }"#,
        )
        .unwrap();
        assert_eq!(map.stid_for("vail"), Some("VAIL1"));
        assert_eq!(map.stid_for("tignes"), None);
        assert_eq!(map.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        assert!(StationMap::load_or_empty(&dir.path().join("nope.json"))
            .unwrap()
            .is_empty());
    }
}
