// src/scoring/normalize.rs
//! Raw metric -> bounded [0,100] component score. Pure, no side effects.
//! `None` in means `None` out: "no data" never becomes a zero.

use crate::config::scoring::{CurvePoint, ScoringConfig, WindBands};
use crate::model::Horizon;

pub const MAX_SCORE: f64 = 100.0;

pub fn clamp_score(v: f64) -> f64 {
    v.clamp(0.0, MAX_SCORE)
}

/// `min(100, value / divisor * 100)`, floored at 0.
fn ratio_score(value: Option<f64>, divisor: f64) -> Option<f64> {
    value
        .filter(|v| v.is_finite())
        .map(|v| clamp_score(v / divisor * MAX_SCORE))
}

/// Piecewise-linear interpolation over a sorted breakpoint table.
/// Inputs outside the table take the nearest end's score.
pub fn eval_curve(points: &[CurvePoint], x: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if x <= first.x {
        return clamp_score(first.score);
    }
    if x >= last.x {
        return clamp_score(last.score);
    }
    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        if x <= b.x {
            let t = (x - a.x) / (b.x - a.x);
            return clamp_score(a.score + t * (b.score - a.score));
        }
    }
    clamp_score(last.score)
}

/// Step function: first band whose upper bound exceeds the speed.
pub fn wind_step(bands: &WindBands, kmh: f64) -> f64 {
    bands
        .bands
        .iter()
        .find(|b| kmh < b.below_kmh)
        .map(|b| b.score)
        .unwrap_or(bands.closed_score)
}

pub struct MetricsNormalizer<'a> {
    cfg: &'a ScoringConfig,
}

impl<'a> MetricsNormalizer<'a> {
    pub fn new(cfg: &'a ScoringConfig) -> Self {
        Self { cfg }
    }

    pub fn base_depth(&self, depth_cm: Option<f64>) -> Option<f64> {
        ratio_score(depth_cm, self.cfg.divisors.base_depth_cm)
    }

    pub fn fresh_snow(&self, new_snow_72h_cm: Option<f64>) -> Option<f64> {
        ratio_score(new_snow_72h_cm, self.cfg.divisors.fresh_snow_72h_cm)
    }

    pub fn forecast_snow(&self, snow_cm: Option<f64>, horizon: Horizon) -> Option<f64> {
        ratio_score(snow_cm, *self.cfg.divisors.forecast_snow_cm.get(horizon))
    }

    pub fn temperature(&self, celsius: Option<f64>) -> Option<f64> {
        celsius
            .filter(|c| c.is_finite())
            .map(|c| eval_curve(&self.cfg.temperature_curve, c))
    }

    pub fn wind(&self, kmh: Option<f64>) -> Option<f64> {
        kmh.filter(|k| k.is_finite())
            .map(|k| clamp_score(wind_step(&self.cfg.wind, k.max(0.0))))
    }

    /// Depends only on the horizon, never on the resort's metrics.
    pub fn forecast_confidence(&self, horizon: Horizon) -> f64 {
        eval_curve(&self.cfg.forecast_confidence_curve, f64::from(horizon.days()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm_cfg() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn ratio_scores_cap_and_propagate_null() {
        let cfg = norm_cfg();
        let n = MetricsNormalizer::new(&cfg);
        assert_eq!(n.base_depth(Some(100.0)), Some(50.0));
        assert_eq!(n.base_depth(Some(450.0)), Some(100.0));
        assert_eq!(n.base_depth(Some(-3.0)), Some(0.0));
        assert_eq!(n.base_depth(None), None);
        assert_eq!(n.fresh_snow(Some(25.0)), Some(50.0));
        assert_eq!(n.fresh_snow(Some(f64::NAN)), None);
        assert_eq!(n.forecast_snow(Some(30.0), Horizon::ThreeDays), Some(100.0));
        assert_eq!(n.forecast_snow(Some(30.0), Horizon::SevenDays), Some(50.0));
    }

    #[test]
    fn temperature_curve_peaks_in_cold_band() {
        let cfg = norm_cfg();
        let n = MetricsNormalizer::new(&cfg);
        assert_eq!(n.temperature(Some(-10.0)), Some(100.0));
        assert_eq!(n.temperature(Some(5.0)), Some(0.0));
        assert_eq!(n.temperature(Some(-20.0)), Some(85.0));
        assert_eq!(n.temperature(Some(-60.0)), Some(40.0));
        assert_eq!(n.temperature(None), None);
    }

    #[test]
    fn wind_bands_step_down() {
        let cfg = norm_cfg();
        let n = MetricsNormalizer::new(&cfg);
        assert_eq!(n.wind(Some(5.0)), Some(100.0));
        assert_eq!(n.wind(Some(20.0)), Some(80.0));
        assert_eq!(n.wind(Some(59.9)), Some(50.0));
        assert_eq!(n.wind(Some(75.0)), Some(20.0));
        assert_eq!(n.wind(Some(95.0)), Some(0.0));
    }

    #[test]
    fn forecast_confidence_tapers_with_horizon() {
        let cfg = norm_cfg();
        let n = MetricsNormalizer::new(&cfg);
        let values: Vec<f64> = Horizon::ALL.iter().map(|h| n.forecast_confidence(*h)).collect();
        assert_eq!(values, vec![100.0, 80.0, 55.0, 20.0]);
    }
}
