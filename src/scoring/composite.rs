// src/scoring/composite.rs
//! Weighted mean of sub-scores with null-exclusion.

use serde::{Deserialize, Serialize};

use crate::config::scoring::HorizonMix;
use crate::error::ConfigError;
use crate::scoring::normalize::{clamp_score, MAX_SCORE};
use crate::scoring::subscores::SubScores;

/// Canonical 0..=1 weight profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub base_depth: f64,
    pub fresh_snow: f64,
    pub temperature: f64,
    pub wind: f64,
    pub forecast: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            base_depth: 0.25,
            fresh_snow: 0.35,
            temperature: 0.20,
            wind: 0.10,
            forecast: 0.10,
        }
    }
}

impl Weights {
    pub fn uniform(w: f64) -> Self {
        Self {
            base_depth: w,
            fresh_snow: w,
            temperature: w,
            wind: w,
            forecast: w,
        }
    }

    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("base_depth", self.base_depth),
            ("fresh_snow", self.fresh_snow),
            ("temperature", self.temperature),
            ("wind", self.wind),
            ("forecast", self.forecast),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.named() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Which profile a composite is computed with.
#[derive(Clone, Copy, Debug)]
pub enum WeightSource<'a> {
    ServerDefault,
    Caller(&'a Weights),
}

/// `Σ(s_i * w_i) / Σ(w_i)` over the non-null dimensions.
/// Null when every sub-score is null or the present weights sum to zero.
pub fn weighted_mean(subs: &SubScores, weights: &Weights) -> Option<f64> {
    let pairs = [
        (subs.base_depth, weights.base_depth),
        (subs.fresh_snow, weights.fresh_snow),
        (subs.temperature, weights.temperature),
        (subs.wind, weights.wind),
        (subs.forecast_confidence, weights.forecast),
    ];
    let (num, den) = pairs
        .iter()
        .filter_map(|(s, w)| s.map(|s| (s * w, *w)))
        .fold((0.0, 0.0), |(n, d), (sw, w)| (n + sw, d + w));
    if den <= 0.0 {
        return None;
    }
    Some(clamp_score(num / den))
}

/// Weighted mean, then dampened by how much of the horizon's signal is forecast
/// and how far that forecast can be trusted: `current + forecast * conf / 100`.
pub fn horizon_composite(subs: &SubScores, weights: &Weights, mix: HorizonMix) -> Option<f64> {
    let base = weighted_mean(subs, weights)?;
    let factor = match subs.forecast_confidence {
        Some(conf) => mix.current + mix.forecast * (conf / MAX_SCORE),
        None => 1.0,
    };
    Some(round1(clamp_score(base * factor)))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(v: [Option<f64>; 5]) -> SubScores {
        SubScores {
            base_depth: v[0],
            fresh_snow: v[1],
            temperature: v[2],
            wind: v[3],
            forecast_confidence: v[4],
        }
    }

    #[test]
    fn equal_weights_average() {
        let w = Weights::uniform(1.0);
        let s = subs([Some(80.0), Some(60.0), Some(100.0), Some(100.0), Some(100.0)]);
        assert_eq!(weighted_mean(&s, &w), Some(88.0));
    }

    #[test]
    fn null_dimension_leaves_the_denominator() {
        let w = Weights::uniform(1.0);
        let s = subs([None, Some(60.0), Some(100.0), Some(100.0), Some(100.0)]);
        assert_eq!(weighted_mean(&s, &w), Some(90.0));
    }

    #[test]
    fn degenerate_inputs_give_null() {
        let s = subs([Some(50.0); 5]);
        assert_eq!(weighted_mean(&s, &Weights::uniform(0.0)), None);
        assert_eq!(weighted_mean(&SubScores::default(), &Weights::default()), None);

        // weight only on a null dimension
        let w = Weights {
            base_depth: 1.0,
            ..Weights::uniform(0.0)
        };
        let s = subs([None, Some(50.0), Some(50.0), Some(50.0), Some(50.0)]);
        assert_eq!(weighted_mean(&s, &w), None);
    }

    #[test]
    fn horizon_mix_now_does_not_discount() {
        let w = Weights::uniform(1.0);
        let s = subs([Some(80.0), Some(60.0), Some(100.0), Some(100.0), Some(100.0)]);
        let now = HorizonMix { current: 1.0, forecast: 0.0 };
        assert_eq!(horizon_composite(&s, &w, now), Some(88.0));
    }

    #[test]
    fn far_horizon_discounts_by_confidence() {
        let w = Weights::uniform(1.0);
        let s = subs([Some(100.0), Some(100.0), Some(100.0), Some(100.0), Some(20.0)]);
        // mean 84, factor 0.1 + 0.9 * 0.2 = 0.28
        let mix = HorizonMix { current: 0.1, forecast: 0.9 };
        assert_eq!(horizon_composite(&s, &w, mix), Some(23.5));
    }

    #[test]
    fn weights_outside_unit_range_are_rejected() {
        let w = Weights {
            wind: 1.5,
            ..Weights::default()
        };
        assert!(matches!(w.validate(), Err(ConfigError::InvalidWeight { name: "wind", .. })));
    }
}
