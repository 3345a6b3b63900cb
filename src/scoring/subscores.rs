// src/scoring/subscores.rs
use serde::{Deserialize, Serialize};

use crate::config::scoring::ScoringConfig;
use crate::model::{Horizon, MetricsSnapshot};
use crate::scoring::normalize::{clamp_score, MetricsNormalizer};

/// One nullable [0,100] value per scoring dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub base_depth: Option<f64>,
    pub fresh_snow: Option<f64>,
    pub temperature: Option<f64>,
    pub wind: Option<f64>,
    pub forecast_confidence: Option<f64>,
}

impl SubScores {
    pub fn is_empty(&self) -> bool {
        self.base_depth.is_none()
            && self.fresh_snow.is_none()
            && self.temperature.is_none()
            && self.wind.is_none()
            && self.forecast_confidence.is_none()
    }
}

pub struct SubScoreCalculator<'a> {
    cfg: &'a ScoringConfig,
}

impl<'a> SubScoreCalculator<'a> {
    pub fn new(cfg: &'a ScoringConfig) -> Self {
        Self { cfg }
    }

    /// `effective_depth_cm` is the override-resolved depth, which may differ from
    /// the snapshot's raw reading.
    pub fn calculate(
        &self,
        snapshot: &MetricsSnapshot,
        effective_depth_cm: Option<f64>,
        horizon: Horizon,
    ) -> SubScores {
        let n = MetricsNormalizer::new(self.cfg);
        SubScores {
            base_depth: n.base_depth(effective_depth_cm),
            fresh_snow: self.fresh_snow(&n, snapshot, horizon),
            temperature: n.temperature(snapshot.temperature_c),
            wind: n.wind(snapshot.wind_speed_kmh),
            forecast_confidence: snapshot
                .has_any_metric()
                .then(|| n.forecast_confidence(horizon)),
        }
    }

    /// Observed 72h snow blended with forecast snow by the horizon's mix.
    /// A missing side falls back to the other one alone.
    fn fresh_snow(
        &self,
        n: &MetricsNormalizer<'_>,
        snapshot: &MetricsSnapshot,
        horizon: Horizon,
    ) -> Option<f64> {
        let recent = n.fresh_snow(snapshot.new_snow_72h_cm);
        let mix = self.cfg.horizon_mix.get(horizon);
        if mix.forecast <= 0.0 {
            return recent;
        }
        let upcoming = n.forecast_snow(snapshot.forecast_snow_cm(horizon), horizon);
        match (recent, upcoming) {
            (Some(r), Some(u)) => Some(clamp_score(r * mix.current + u * mix.forecast)),
            (Some(r), None) => Some(r),
            (None, Some(u)) => Some(u),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForecastDay;
    use chrono::{NaiveDate, Utc};

    fn snapshot() -> MetricsSnapshot {
        let mut s = MetricsSnapshot::unavailable(Utc::now());
        s.base_depth_cm = Some(150.0);
        s.new_snow_72h_cm = Some(25.0);
        s.temperature_c = Some(-8.0);
        s.wind_speed_kmh = Some(10.0);
        s.forecast = (0..14)
            .map(|i| ForecastDay {
                date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap() + chrono::Duration::days(i),
                snowfall_cm: Some(10.0),
                temperature_max_c: None,
                temperature_min_c: None,
                wind_speed_max_kmh: None,
                precipitation_probability_pct: None,
                weather_code: None,
                confidence: 1.0,
            })
            .collect();
        s
    }

    #[test]
    fn now_horizon_uses_observed_snow_only() {
        let cfg = ScoringConfig::default();
        let subs = SubScoreCalculator::new(&cfg).calculate(&snapshot(), Some(150.0), Horizon::Now);
        assert_eq!(subs.base_depth, Some(75.0));
        assert_eq!(subs.fresh_snow, Some(50.0));
        assert_eq!(subs.temperature, Some(100.0));
        assert_eq!(subs.wind, Some(100.0));
        assert_eq!(subs.forecast_confidence, Some(100.0));
    }

    #[test]
    fn later_horizons_blend_forecast_snow() {
        let cfg = ScoringConfig::default();
        // 3 days * 10cm = 30cm over a 30cm divisor -> 100; 50 * 0.6 + 100 * 0.4 = 70
        let subs =
            SubScoreCalculator::new(&cfg).calculate(&snapshot(), Some(150.0), Horizon::ThreeDays);
        assert_eq!(subs.fresh_snow, Some(70.0));
        assert_eq!(subs.forecast_confidence, Some(80.0));
    }

    #[test]
    fn override_depth_feeds_base_depth() {
        let cfg = ScoringConfig::default();
        let subs = SubScoreCalculator::new(&cfg).calculate(&snapshot(), Some(200.0), Horizon::Now);
        assert_eq!(subs.base_depth, Some(100.0));
    }

    #[test]
    fn empty_snapshot_is_all_null() {
        let cfg = ScoringConfig::default();
        let snap = MetricsSnapshot::unavailable(Utc::now());
        let subs = SubScoreCalculator::new(&cfg).calculate(&snap, None, Horizon::SevenDays);
        assert!(subs.is_empty());
    }

    #[test]
    fn override_alone_still_scores_depth() {
        let cfg = ScoringConfig::default();
        let snap = MetricsSnapshot::unavailable(Utc::now());
        let subs = SubScoreCalculator::new(&cfg).calculate(&snap, Some(100.0), Horizon::Now);
        assert_eq!(subs.base_depth, Some(50.0));
        assert_eq!(subs.forecast_confidence, None);
    }
}
