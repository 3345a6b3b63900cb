// src/api/public.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};

use crate::api::{ApiError, ApiResult, AppState};
use crate::hierarchy::{Hierarchy, HierarchyIndexer};
use crate::model::{ForecastDay, Horizon, Resort};
use crate::quality::{QualityFlag, QualityTier};
use crate::ranking::{
    depth_source_label, PageRequest, RankingAssembler, RankingFilter, RankingPage, RankingQuery,
    SnapshotView, SortKey,
};
use crate::scoring::{SubScores, WeightSource, Weights};

#[derive(Serialize)]
pub struct HealthResp {
    status: &'static str,
    last_pipeline_run: Option<DateTime<Utc>>,
    resorts_count: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        last_pipeline_run: state.store.last_run_at(),
        resorts_count: state.catalog.len(),
    })
}

fn parse_horizon(days: Option<u8>) -> ApiResult<Horizon> {
    match days {
        None => Ok(Horizon::default()),
        Some(d) => Horizon::from_days(d).ok_or_else(|| {
            ApiError::BadRequest(format!("horizon_days must be one of 0, 3, 7, 14 (got {d})"))
        }),
    }
}

fn split_csv(v: Option<&str>) -> Vec<String> {
    v.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn query_params<T>(q: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    q.map(|Query(p)| p)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingsParams {
    horizon_days: Option<u8>,
    continent: Option<String>,
    ski_region: Option<String>,
    country: Option<String>,
    region: Option<String>,
    subregion: Option<String>,
    sort: Option<SortKey>,
    page: Option<u32>,
    per_page: Option<u32>,
    w_base_depth: Option<f64>,
    w_fresh_snow: Option<f64>,
    w_temperature: Option<f64>,
    w_wind: Option<f64>,
    w_forecast: Option<f64>,
}

impl RankingsParams {
    /// `None` when the caller supplied no weight at all.
    fn caller_weights(&self, defaults: &Weights) -> ApiResult<Option<Weights>> {
        let given = [
            self.w_base_depth,
            self.w_fresh_snow,
            self.w_temperature,
            self.w_wind,
            self.w_forecast,
        ];
        if given.iter().all(Option::is_none) {
            return Ok(None);
        }
        let w = Weights {
            base_depth: self.w_base_depth.unwrap_or(defaults.base_depth),
            fresh_snow: self.w_fresh_snow.unwrap_or(defaults.fresh_snow),
            temperature: self.w_temperature.unwrap_or(defaults.temperature),
            wind: self.w_wind.unwrap_or(defaults.wind),
            forecast: self.w_forecast.unwrap_or(defaults.forecast),
        };
        w.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(Some(w))
    }

    fn filter(&self) -> RankingFilter {
        RankingFilter {
            continent: self.continent.clone().filter(|c| !c.trim().is_empty()),
            ski_regions: split_csv(self.ski_region.as_deref()),
            countries: split_csv(self.country.as_deref()),
            regions: split_csv(self.region.as_deref()),
            subregions: split_csv(self.subregion.as_deref()),
        }
    }
}

pub async fn rankings(
    State(state): State<AppState>,
    params: Result<Query<RankingsParams>, QueryRejection>,
) -> ApiResult<Json<RankingPage>> {
    let params = query_params(params)?;
    let horizon = parse_horizon(params.horizon_days)?;
    let page = PageRequest::new(params.page, params.per_page).map_err(ApiError::BadRequest)?;
    let weights = params.caller_weights(state.engine.default_weights())?;

    let query = RankingQuery {
        horizon,
        filter: params.filter(),
        sort: params.sort.unwrap_or_default(),
        page,
    };
    let source = match &weights {
        Some(w) => WeightSource::Caller(w),
        None => WeightSource::ServerDefault,
    };
    let run = state.store.latest();
    let page = RankingAssembler::new(&state.engine).assemble(
        &state.catalog,
        &run,
        &query,
        source,
        Utc::now(),
    );
    Ok(Json(page))
}

#[derive(Debug, Default, Deserialize)]
pub struct HorizonParams {
    horizon_days: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct MapPoint {
    slug: String,
    name: String,
    lat: f64,
    lon: f64,
    region: Option<String>,
    score: Option<f64>,
}

pub async fn rankings_map(
    State(state): State<AppState>,
    params: Result<Query<HorizonParams>, QueryRejection>,
) -> ApiResult<Json<Vec<MapPoint>>> {
    let horizon = parse_horizon(query_params(params)?.horizon_days)?;
    let run = state.store.latest();
    let mut points: Vec<MapPoint> = state
        .catalog
        .resorts()
        .iter()
        .filter_map(|r| {
            let c = run.entry(r.id)?;
            Some(MapPoint {
                slug: r.slug.clone(),
                name: r.name.clone(),
                lat: r.latitude,
                lon: r.longitude,
                region: r.region.clone(),
                score: c.scores.get(horizon).score,
            })
        })
        .collect();
    points.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(Json(points))
}

#[derive(Debug, Serialize)]
pub struct HorizonSummary {
    horizon_days: u8,
    score: Option<f64>,
    predicted_snow_cm: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ResortDetail {
    resort: Resort,
    horizon_days: u8,
    score: Option<f64>,
    sub_scores: SubScores,
    snapshot: Option<SnapshotView>,
    quality: Option<QualityTier>,
    quality_flags: Vec<QualityFlag>,
    depth_source: Option<String>,
    override_active: bool,
    stale_data: bool,
    generated_at: Option<DateTime<Utc>>,
    horizons: Vec<HorizonSummary>,
    forecast: Vec<ForecastDay>,
}

pub async fn resort_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    params: Result<Query<HorizonParams>, QueryRejection>,
) -> ApiResult<Json<ResortDetail>> {
    let horizon = parse_horizon(query_params(params)?.horizon_days)?;
    let resort = state
        .catalog
        .by_slug(&slug)
        .ok_or_else(|| ApiError::resort_not_found(&slug))?;
    let run = state.store.latest();
    let assembler = RankingAssembler::new(&state.engine);

    let detail = match run.entry(resort.id) {
        Some(c) => {
            let hs = c.scores.get(horizon);
            ResortDetail {
                resort: resort.clone(),
                horizon_days: horizon.days(),
                score: hs.score,
                sub_scores: hs.sub_scores,
                snapshot: Some(SnapshotView::from_conditions(c)),
                quality: Some(c.quality.tier),
                quality_flags: c.quality.flags.clone(),
                depth_source: depth_source_label(c),
                override_active: c.override_applied,
                stale_data: assembler.is_stale(run.completed_at, Utc::now()),
                generated_at: run.completed_at,
                horizons: c
                    .scores
                    .iter()
                    .map(|(h, s)| HorizonSummary {
                        horizon_days: h.days(),
                        score: s.score,
                        predicted_snow_cm: s.predicted_snow_cm,
                    })
                    .collect(),
                forecast: c.snapshot.forecast.clone(),
            }
        }
        None => ResortDetail {
            resort: resort.clone(),
            horizon_days: horizon.days(),
            score: None,
            sub_scores: SubScores::default(),
            snapshot: None,
            quality: None,
            quality_flags: Vec::new(),
            depth_source: None,
            override_active: false,
            stale_data: false,
            generated_at: None,
            horizons: Vec::new(),
            forecast: Vec::new(),
        },
    };
    Ok(Json(detail))
}

#[derive(Debug, Serialize)]
pub struct ForecastResp {
    slug: String,
    forecast_source: Option<String>,
    days: Vec<ForecastDay>,
}

pub async fn resort_forecast(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ForecastResp>> {
    let resort = state
        .catalog
        .by_slug(&slug)
        .ok_or_else(|| ApiError::resort_not_found(&slug))?;
    let run = state.store.latest();
    let entry = run.entry(resort.id);
    Ok(Json(ForecastResp {
        slug: resort.slug.clone(),
        forecast_source: entry.and_then(|c| c.snapshot.forecast_source.clone()),
        days: entry.map(|c| c.snapshot.forecast.clone()).unwrap_or_default(),
    }))
}

/// Only resorts with an entry in the current run are counted.
pub async fn regions(State(state): State<AppState>) -> Json<Hierarchy> {
    let run = state.store.latest();
    let current = state
        .catalog
        .resorts()
        .iter()
        .filter(|r| run.entry(r.id).is_some());
    Json(HierarchyIndexer::build(current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_filters_trim_and_drop_empties() {
        assert_eq!(split_csv(Some(" US, CA ,,")), vec!["US", "CA"]);
        assert!(split_csv(None).is_empty());
    }

    #[test]
    fn partial_caller_weights_fill_from_defaults() {
        let params = RankingsParams {
            w_fresh_snow: Some(1.0),
            ..RankingsParams::default()
        };
        let w = params.caller_weights(&Weights::default()).unwrap().unwrap();
        assert_eq!(w.fresh_snow, 1.0);
        assert_eq!(w.base_depth, Weights::default().base_depth);

        assert!(RankingsParams::default()
            .caller_weights(&Weights::default())
            .unwrap()
            .is_none());

        let bad = RankingsParams {
            w_wind: Some(4.0),
            ..RankingsParams::default()
        };
        assert!(bad.caller_weights(&Weights::default()).is_err());
    }

    #[test]
    fn horizon_must_be_known() {
        assert_eq!(parse_horizon(None).unwrap(), Horizon::Now);
        assert_eq!(parse_horizon(Some(7)).unwrap(), Horizon::SevenDays);
        assert!(parse_horizon(Some(5)).is_err());
    }
}
