// src/scoring/mod.rs
//! Scoring model: normalization curves, sub-scores and the weighted composite.
//!
//! `ScoringEngine` is the single entry point. The daily pipeline scores with the
//! server profile; the rankings endpoint re-scores cached sub-scores with
//! caller-supplied weights through the same function.

pub mod composite;
pub mod normalize;
pub mod subscores;

use serde::Serialize;

use crate::config::scoring::ScoringConfig;
use crate::model::{Horizon, MetricsSnapshot};

pub use composite::{WeightSource, Weights};
pub use normalize::MetricsNormalizer;
pub use subscores::{SubScoreCalculator, SubScores};

/// Per-(resort, run, horizon) scoring result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HorizonScore {
    pub sub_scores: SubScores,
    pub score: Option<f64>,
    pub predicted_snow_cm: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    cfg: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn default_weights(&self) -> &Weights {
        &self.cfg.weights
    }

    pub fn sub_scores(
        &self,
        snapshot: &MetricsSnapshot,
        effective_depth_cm: Option<f64>,
        horizon: Horizon,
    ) -> SubScores {
        SubScoreCalculator::new(&self.cfg).calculate(snapshot, effective_depth_cm, horizon)
    }

    pub fn composite(&self, subs: &SubScores, horizon: Horizon, source: WeightSource<'_>) -> Option<f64> {
        let weights = match source {
            WeightSource::ServerDefault => &self.cfg.weights,
            WeightSource::Caller(w) => w,
        };
        composite::horizon_composite(subs, weights, *self.cfg.horizon_mix.get(horizon))
    }

    pub fn score_horizon(
        &self,
        snapshot: &MetricsSnapshot,
        effective_depth_cm: Option<f64>,
        horizon: Horizon,
    ) -> HorizonScore {
        let sub_scores = self.sub_scores(snapshot, effective_depth_cm, horizon);
        HorizonScore {
            sub_scores,
            score: self.composite(&sub_scores, horizon, WeightSource::ServerDefault),
            predicted_snow_cm: snapshot.forecast_snow_cm(horizon),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn caller_weights_change_the_composite_only() {
        let engine = ScoringEngine::default();
        let mut snap = MetricsSnapshot::unavailable(Utc::now());
        snap.base_depth_cm = Some(200.0);
        snap.new_snow_72h_cm = Some(0.0);
        snap.temperature_c = Some(-10.0);
        snap.wind_speed_kmh = Some(5.0);

        let server = engine.score_horizon(&snap, snap.base_depth_cm, Horizon::Now);
        // 100*.25 + 0*.35 + 100*.2 + 100*.1 + 100*.1 = 65
        assert_eq!(server.score, Some(65.0));

        let depth_only = Weights {
            base_depth: 1.0,
            ..Weights::uniform(0.0)
        };
        let caller = engine.composite(&server.sub_scores, Horizon::Now, WeightSource::Caller(&depth_only));
        assert_eq!(caller, Some(100.0));
    }
}
