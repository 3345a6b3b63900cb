// tests/support/mod.rs
//
// Shared builders for the integration tests: resorts, fixture conditions,
// a fully wired AppState, and small HTTP helpers over `oneshot`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`
use uuid::Uuid;

use skirank::api::{ApiKeys, AppState};
use skirank::config::ScoringConfig;
use skirank::ingest::providers::FixtureProvider;
use skirank::ingest::FetchedConditions;
use skirank::model::{DepthReading, DepthSource, Resort};
use skirank::pipeline::PipelineSettings;
use skirank::store::ResortCatalog;

pub const BODY_LIMIT: usize = 1 * 1024 * 1024; // 1MB, safe for tests
pub const ADMIN_KEY: &str = "test-admin-key";

/// Mid-season instant so seasonal plausibility rules stay quiet.
pub fn winter_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 10, 6, 0, 0).unwrap()
}

pub fn resort(slug: &str, country: &str, region: Option<&str>, subregion: Option<&str>) -> Resort {
    Resort {
        id: Uuid::new_v4(),
        slug: slug.into(),
        name: slug.replace('-', " "),
        latitude: if matches!(country, "AU" | "NZ" | "CL" | "AR") { -36.0 } else { 45.0 },
        longitude: 7.0,
        elevation_base_m: Some(1500),
        elevation_summit_m: Some(3200),
        country: Some(country.into()),
        region: region.map(String::from),
        subregion: subregion.map(String::from),
        continent: None,
        ski_region: None,
        website_url: Some(format!("https://{slug}.example")),
    }
}

/// Station-verified conditions observed at `at`.
pub fn station(depth_cm: f64, new_snow_24h_cm: f64, at: DateTime<Utc>) -> FetchedConditions {
    FetchedConditions {
        depth_readings: vec![DepthReading {
            source: DepthSource::Station,
            depth_cm,
            observed_at: at,
        }],
        new_snow_24h_cm: Some(new_snow_24h_cm),
        new_snow_72h_cm: Some(new_snow_24h_cm * 2.0),
        temperature_c: Some(-8.0),
        avg_temp_72h_c: Some(-6.0),
        wind_speed_kmh: Some(15.0),
        forecast_source: None,
        forecast: Vec::new(),
    }
}

/// Model-only conditions, no secondary source.
pub fn model_only(depth_cm: f64, at: DateTime<Utc>) -> FetchedConditions {
    let mut c = station(depth_cm, 0.0, at);
    c.depth_readings[0].source = DepthSource::Model;
    c
}

pub struct Harness {
    pub state: AppState,
    pub router: Router,
}

impl Harness {
    pub fn resort_id(&self, slug: &str) -> Uuid {
        self.state.catalog.by_slug(slug).expect("known slug").id
    }
}

pub fn harness_with(
    resorts: Vec<Resort>,
    conditions: HashMap<String, FetchedConditions>,
    admin_keys: &str,
) -> Harness {
    harness_with_state_dir(resorts, conditions, admin_keys, None)
}

/// With `state_dir`, overrides and the last run are saved to
/// `<dir>/overrides.json` and `<dir>/last_run.json`.
pub fn harness_with_state_dir(
    resorts: Vec<Resort>,
    conditions: HashMap<String, FetchedConditions>,
    admin_keys: &str,
    state_dir: Option<&Path>,
) -> Harness {
    let catalog = ResortCatalog::new(resorts).expect("valid catalog");
    let settings = PipelineSettings {
        concurrency: 4,
        fetch_timeout: Duration::from_secs(5),
        override_state_path: state_dir.map(|d| d.join("overrides.json")),
        run_state_path: state_dir.map(|d| d.join("last_run.json")),
    };
    let state = skirank::assemble_state(
        catalog,
        ScoringConfig::default(),
        Arc::new(FixtureProvider::from_map(conditions)),
        settings,
        ApiKeys::from_comma_separated(admin_keys),
    );
    let router = skirank::create_router(state.clone());
    Harness { state, router }
}

pub fn harness(
    resorts: Vec<Resort>,
    conditions: HashMap<String, FetchedConditions>,
) -> Harness {
    harness_with(resorts, conditions, ADMIN_KEY)
}

async fn read_json(resp: shuttle_axum::axum::response::Response) -> (StatusCode, Json) {
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, v)
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let resp = router.clone().oneshot(req).await.expect("oneshot GET");
    read_json(resp).await
}

pub async fn admin_request(
    router: &Router,
    method: &str,
    uri: &str,
    key: Option<&str>,
    payload: Option<Json>,
) -> (StatusCode, Json) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(k) = key {
        builder = builder.header("x-admin-key", k);
    }
    let body = match payload {
        Some(p) => {
            builder = builder.header("content-type", "application/json");
            Body::from(p.to_string())
        }
        None => Body::empty(),
    };
    let req = builder.body(body).expect("build admin request");
    let resp = router.clone().oneshot(req).await.expect("oneshot admin");
    read_json(resp).await
}
