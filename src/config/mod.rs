// src/config/mod.rs
//! Service settings from the environment, plus the scoring tunables in `scoring`.

pub mod scoring;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub use scoring::ScoringConfig;

pub const ENV_CATALOG_PATH: &str = "SKIRANK_CATALOG_PATH";
pub const ENV_PROVIDER: &str = "SKIRANK_PROVIDER";
pub const ENV_FIXTURE_PATH: &str = "SKIRANK_FIXTURE_PATH";
pub const ENV_OPEN_METEO_BASE_URL: &str = "OPEN_METEO_BASE_URL";
pub const ENV_PIPELINE_CONCURRENCY: &str = "PIPELINE_CONCURRENCY";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
pub const ENV_PIPELINE_SCHEDULE_UTC: &str = "PIPELINE_SCHEDULE_UTC";
pub const ENV_PIPELINE_RUN_ON_STARTUP: &str = "PIPELINE_RUN_ON_STARTUP";
pub const ENV_OVERRIDE_STATE_PATH: &str = "OVERRIDE_STATE_PATH";
pub const ENV_RUN_STATE_PATH: &str = "RUN_STATE_PATH";
pub const ENV_SYNOPTIC_API_TOKEN: &str = "SYNOPTIC_API_TOKEN";
pub const ENV_SYNOPTIC_API_URL: &str = "SYNOPTIC_API_URL";
pub const ENV_STATION_MAP_PATH: &str = "SKIRANK_STATION_MAP_PATH";
pub const ENV_ADMIN_API_KEYS: &str = "ADMIN_API_KEYS";
pub const ENV_ENABLE_METRICS: &str = "ENABLE_METRICS";

pub const DEFAULT_CATALOG_PATH: &str = "data/resorts.json";
pub const DEFAULT_OVERRIDE_STATE_PATH: &str = "state/overrides.json";
pub const DEFAULT_RUN_STATE_PATH: &str = "state/last_run.json";
pub const DEFAULT_OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_SYNOPTIC_API_URL: &str = "https://api.synopticdata.com/v2";
pub const DEFAULT_STATION_MAP_PATH: &str = "data/resort_station_map.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenMeteo,
    Fixture,
}

/// Daily trigger time, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
}

impl Default for ScheduleTime {
    fn default() -> Self {
        Self { hour: 6, minute: 0 }
    }
}

impl std::str::FromStr for ScheduleTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("schedule must look like HH:MM (got {s:?})"))?;
        let hour: u32 = h.parse()?;
        let minute: u32 = m.parse()?;
        if hour > 23 || minute > 59 {
            return Err(anyhow!("schedule out of range: {s:?}"));
        }
        Ok(Self { hour, minute })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog_path: PathBuf,
    pub provider: ProviderKind,
    pub fixture_path: Option<PathBuf>,
    pub open_meteo_base_url: String,
    pub pipeline_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub schedule: ScheduleTime,
    pub run_on_startup: bool,
    /// `None` disables override persistence.
    pub override_state_path: Option<PathBuf>,
    /// `None` disables last-run persistence.
    pub run_state_path: Option<PathBuf>,
    /// Station depth enrichment is on only when a token is set.
    pub synoptic_api_token: Option<String>,
    pub synoptic_api_url: String,
    pub station_map_path: PathBuf,
    pub admin_api_keys: String,
    pub enable_metrics: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            provider: ProviderKind::OpenMeteo,
            fixture_path: None,
            open_meteo_base_url: DEFAULT_OPEN_METEO_BASE_URL.to_string(),
            pipeline_concurrency: 8,
            fetch_timeout_secs: 30,
            schedule: ScheduleTime::default(),
            run_on_startup: false,
            override_state_path: Some(PathBuf::from(DEFAULT_OVERRIDE_STATE_PATH)),
            run_state_path: Some(PathBuf::from(DEFAULT_RUN_STATE_PATH)),
            synoptic_api_token: None,
            synoptic_api_url: DEFAULT_SYNOPTIC_API_URL.to_string(),
            station_map_path: PathBuf::from(DEFAULT_STATION_MAP_PATH),
            admin_api_keys: String::new(),
            enable_metrics: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let provider = match std::env::var(ENV_PROVIDER)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "" | "open_meteo" | "open-meteo" => ProviderKind::OpenMeteo,
            "fixture" => ProviderKind::Fixture,
            other => return Err(anyhow!("unknown {ENV_PROVIDER}: {other}")),
        };

        let schedule = match std::env::var(ENV_PIPELINE_SCHEDULE_UTC) {
            Ok(v) => v.parse()?,
            Err(_) => defaults.schedule,
        };

        let override_state_path =
            optional_path(ENV_OVERRIDE_STATE_PATH, defaults.override_state_path);
        let run_state_path = optional_path(ENV_RUN_STATE_PATH, defaults.run_state_path);

        Ok(Self {
            catalog_path: std::env::var(ENV_CATALOG_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            provider,
            fixture_path: std::env::var(ENV_FIXTURE_PATH).ok().map(PathBuf::from),
            open_meteo_base_url: std::env::var(ENV_OPEN_METEO_BASE_URL)
                .unwrap_or(defaults.open_meteo_base_url),
            pipeline_concurrency: std::env::var(ENV_PIPELINE_CONCURRENCY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pipeline_concurrency)
                .max(1),
            fetch_timeout_secs: std::env::var(ENV_FETCH_TIMEOUT_SECS)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fetch_timeout_secs),
            schedule,
            run_on_startup: env_flag(ENV_PIPELINE_RUN_ON_STARTUP),
            override_state_path,
            run_state_path,
            synoptic_api_token: std::env::var(ENV_SYNOPTIC_API_TOKEN)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            synoptic_api_url: std::env::var(ENV_SYNOPTIC_API_URL)
                .unwrap_or(defaults.synoptic_api_url),
            station_map_path: std::env::var(ENV_STATION_MAP_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.station_map_path),
            admin_api_keys: std::env::var(ENV_ADMIN_API_KEYS).unwrap_or_default(),
            enable_metrics: env_flag(ENV_ENABLE_METRICS),
        })
    }
}

/// Unset keeps the default, an empty value disables.
fn optional_path(name: &str, default: Option<PathBuf>) -> Option<PathBuf> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => default,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
}
