// src/ranking.rs
//! Read-side join of resort, latest run and override state into sorted,
//! paginated ranking entries.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{self, slugify};
use crate::model::{Horizon, MetricsSnapshot, Resort};
use crate::quality::{QualityFlag, QualityTier};
use crate::scoring::{ScoringEngine, SubScores, WeightSource};
use crate::store::{ResortCatalog, ResortConditions, RunSnapshot};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Score,
    #[serde(alias = "forecast_snow")]
    PredictedSnow,
}

/// Empty lists match everything. Multi-valued fields are OR-ed.
#[derive(Debug, Clone, Default)]
pub struct RankingFilter {
    pub continent: Option<String>,
    pub ski_regions: Vec<String>,
    pub countries: Vec<String>,
    pub regions: Vec<String>,
    pub subregions: Vec<String>,
}

fn matches_any(wanted: &[String], value: Option<&str>, eq: impl Fn(&str, &str) -> bool) -> bool {
    wanted.is_empty() || value.is_some_and(|v| wanted.iter().any(|w| eq(w, v)))
}

impl RankingFilter {
    pub fn matches(&self, resort: &Resort) -> bool {
        let slug_eq = |w: &str, v: &str| slugify(w) == slugify(v);
        let ci_eq = |w: &str, v: &str| w.trim().eq_ignore_ascii_case(v.trim());

        let ski_region = hierarchy::ski_region_label(resort);
        let continent_ok = self
            .continent
            .as_deref()
            .map_or(true, |c| slug_eq(c, hierarchy::continent_label(resort)));
        continent_ok
            && matches_any(&self.ski_regions, Some(ski_region.as_str()), slug_eq)
            && matches_any(&self.countries, resort.country.as_deref(), ci_eq)
            && matches_any(&self.regions, resort.region.as_deref(), ci_eq)
            && matches_any(&self.subregions, resort.subregion.as_deref(), ci_eq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Result<Self, String> {
        let req = Self {
            page: page.unwrap_or(1),
            per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        };
        if req.page < 1 {
            return Err("page must be >= 1".to_string());
        }
        if req.per_page < 1 || req.per_page > MAX_PAGE_SIZE {
            return Err(format!("per_page must be between 1 and {MAX_PAGE_SIZE}"));
        }
        Ok(req)
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingMeta {
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub horizon_days: u8,
}

/// Public view of a snapshot with the effective depth substituted.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub base_depth_cm: Option<f64>,
    pub new_snow_24h_cm: Option<f64>,
    pub new_snow_72h_cm: Option<f64>,
    pub temperature_c: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub fetched_at: DateTime<Utc>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl SnapshotView {
    pub fn from_conditions(c: &ResortConditions) -> Self {
        let s: &MetricsSnapshot = &c.snapshot;
        Self {
            base_depth_cm: c.effective_depth_cm,
            new_snow_24h_cm: s.new_snow_24h_cm,
            new_snow_72h_cm: s.new_snow_72h_cm,
            temperature_c: s.temperature_c,
            wind_speed_kmh: s.wind_speed_kmh,
            fetched_at: s.fetched_at,
            observed_at: s.observed_at,
        }
    }
}

pub const MANUAL_OVERRIDE_SOURCE: &str = "manual_override";

/// `manual_override` when an operator value supplied the depth.
pub fn depth_source_label(c: &ResortConditions) -> Option<String> {
    if c.override_applied {
        return Some(MANUAL_OVERRIDE_SOURCE.to_string());
    }
    c.snapshot.depth_source.map(|s| s.as_str().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub resort: Resort,
    pub score: Option<f64>,
    pub sub_scores: SubScores,
    pub snapshot: SnapshotView,
    pub quality: QualityTier,
    pub quality_flags: Vec<QualityFlag>,
    pub stale_data: bool,
    pub predicted_snow_cm: Option<f64>,
    pub forecast_source: Option<String>,
    pub depth_source: Option<String>,
    pub override_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingPage {
    pub meta: RankingMeta,
    pub generated_at: Option<DateTime<Utc>>,
    pub results: Vec<RankingEntry>,
}

#[derive(Debug, Clone)]
pub struct RankingQuery {
    pub horizon: Horizon,
    pub filter: RankingFilter,
    pub sort: SortKey,
    pub page: PageRequest,
}

struct Candidate<'a> {
    resort: &'a Resort,
    conditions: &'a ResortConditions,
    score: Option<f64>,
    sub_scores: SubScores,
    predicted_snow_cm: Option<f64>,
}

/// Descending with `None` last.
fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare(sort: SortKey, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    // unscored entries trail every scored entry whatever the sort key
    let scored = b.score.is_some().cmp(&a.score.is_some());
    let primary = match sort {
        SortKey::Score => desc_nulls_last(a.score, b.score),
        SortKey::PredictedSnow => desc_nulls_last(a.predicted_snow_cm, b.predicted_snow_cm)
            .then_with(|| desc_nulls_last(a.score, b.score)),
    };
    scored
        .then(primary)
        .then_with(|| a.resort.id.cmp(&b.resort.id))
}

pub struct RankingAssembler<'a> {
    engine: &'a ScoringEngine,
}

impl<'a> RankingAssembler<'a> {
    pub fn new(engine: &'a ScoringEngine) -> Self {
        Self { engine }
    }

    /// Whether a run completed at `generated_at` is past the freshness window.
    pub fn is_stale(&self, generated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let window = Duration::hours(self.engine.config().freshness.stale_after_hours);
        generated_at.is_some_and(|t| now - t > window)
    }

    pub fn assemble(
        &self,
        catalog: &ResortCatalog,
        run: &RunSnapshot,
        query: &RankingQuery,
        weights: WeightSource<'_>,
        now: DateTime<Utc>,
    ) -> RankingPage {
        let mut candidates: Vec<Candidate<'_>> = catalog
            .resorts()
            .iter()
            .filter(|r| query.filter.matches(r))
            .filter_map(|r| run.entry(r.id).map(|c| (r, c)))
            .map(|(resort, conditions)| {
                let hs = conditions.scores.get(query.horizon);
                let score = match weights {
                    WeightSource::ServerDefault => hs.score,
                    WeightSource::Caller(_) => {
                        self.engine.composite(&hs.sub_scores, query.horizon, weights)
                    }
                };
                Candidate {
                    resort,
                    conditions,
                    score,
                    sub_scores: hs.sub_scores,
                    predicted_snow_cm: hs.predicted_snow_cm,
                }
            })
            .collect();

        candidates.sort_by(|a, b| compare(query.sort, a, b));

        let total = candidates.len();
        let per_page = query.page.per_page;
        let total_pages = total.div_ceil(per_page as usize) as u32;
        let offset = query.page.offset();
        let stale = self.is_stale(run.completed_at, now);

        let results = candidates
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(per_page as usize)
            .map(|(i, c)| RankingEntry {
                rank: i + 1,
                resort: c.resort.clone(),
                score: c.score,
                sub_scores: c.sub_scores,
                snapshot: SnapshotView::from_conditions(c.conditions),
                quality: c.conditions.quality.tier,
                quality_flags: c.conditions.quality.flags.clone(),
                stale_data: stale,
                predicted_snow_cm: c.predicted_snow_cm,
                forecast_source: c.conditions.snapshot.forecast_source.clone(),
                depth_source: depth_source_label(c.conditions),
                override_active: c.conditions.override_applied,
            })
            .collect();

        RankingPage {
            meta: RankingMeta {
                total,
                page: query.page.page,
                per_page,
                total_pages,
                horizon_days: query.horizon.days(),
            },
            generated_at: run.completed_at,
            results,
        }
    }
}
