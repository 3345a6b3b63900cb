// src/quality.rs
//! Per-run data-quality classification of a resort's depth reading.
//!
//! Tiers are recomputed from scratch every run. Flags are additive evidence and
//! may accompany any tier.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Serialize, Serializer};

use crate::config::scoring::{FreshnessConfig, PlausibilityConfig, ScoringConfig};
use crate::model::{DepthSource, MetricsSnapshot, Resort};

/// Ordered by trust: `Stale < Unreliable < Suspect < Good < Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Stale,
    Unreliable,
    Suspect,
    Good,
    Verified,
}

impl QualityTier {
    /// Highest trust first.
    pub const ALL: [QualityTier; 5] = [
        QualityTier::Verified,
        QualityTier::Good,
        QualityTier::Suspect,
        QualityTier::Unreliable,
        QualityTier::Stale,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Verified => "verified",
            QualityTier::Good => "good",
            QualityTier::Suspect => "suspect",
            QualityTier::Unreliable => "unreliable",
            QualityTier::Stale => "stale",
        }
    }

    /// The bottom three tiers make up the administrative "flagged" set.
    pub fn is_flagged(self) -> bool {
        self <= QualityTier::Suspect
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QualityFlag {
    FetchFailed,
    NoDepthReading,
    NoStationData,
    SingleSourceUnverified,
    DataOlderThan { hours: i64 },
    DepthImplausibleOffseason,
    DepthExceedsElevationMaximum { max_cm: f64 },
    DepthGainUnexplainedBySnowfall,
    DepthLossImplausiblyLarge,
    CrossSourceVariance { ratio: f64 },
    HighDepthInconsistentWithWarmTemps,
}

impl QualityFlag {
    /// Plausibility rule failures demote the tier; the rest are provenance notes.
    fn is_rule_failure(&self) -> bool {
        matches!(
            self,
            QualityFlag::DepthImplausibleOffseason
                | QualityFlag::DepthExceedsElevationMaximum { .. }
                | QualityFlag::DepthGainUnexplainedBySnowfall
                | QualityFlag::DepthLossImplausiblyLarge
                | QualityFlag::CrossSourceVariance { .. }
                | QualityFlag::HighDepthInconsistentWithWarmTemps
        )
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityFlag::FetchFailed => f.write_str("fetch_failed"),
            QualityFlag::NoDepthReading => f.write_str("no_depth_reading"),
            QualityFlag::NoStationData => f.write_str("no_station_data"),
            QualityFlag::SingleSourceUnverified => f.write_str("single_source_unverified"),
            QualityFlag::DataOlderThan { hours } => write!(f, "data_older_than_{hours}h"),
            QualityFlag::DepthImplausibleOffseason => f.write_str("depth_implausible_offseason"),
            QualityFlag::DepthExceedsElevationMaximum { max_cm } => {
                write!(f, "depth_exceeds_elevation_maximum_{max_cm:.0}cm")
            }
            QualityFlag::DepthGainUnexplainedBySnowfall => {
                f.write_str("depth_gain_unexplained_by_snowfall")
            }
            QualityFlag::DepthLossImplausiblyLarge => f.write_str("depth_loss_implausibly_large"),
            QualityFlag::CrossSourceVariance { ratio } => {
                write!(f, "cross_source_variance_ratio_{ratio:.1}x")
            }
            QualityFlag::HighDepthInconsistentWithWarmTemps => {
                f.write_str("high_depth_inconsistent_with_warm_temps")
            }
        }
    }
}

impl Serialize for QualityFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAssessment {
    pub tier: QualityTier,
    pub flags: Vec<QualityFlag>,
}

impl QualityAssessment {
    pub fn has_flag(&self, flag: &QualityFlag) -> bool {
        self.flags.contains(flag)
    }
}

/// Everything the classifier looks at for one resort.
#[derive(Debug, Clone, Copy)]
pub struct QualityInput<'a> {
    pub resort: &'a Resort,
    pub snapshot: &'a MetricsSnapshot,
    /// Raw depth from the previously published run, if any.
    pub previous_depth_cm: Option<f64>,
    pub fetch_failed: bool,
    pub now: DateTime<Utc>,
}

pub struct QualityClassifier<'a> {
    freshness: &'a FreshnessConfig,
    rules: &'a PlausibilityConfig,
}

impl<'a> QualityClassifier<'a> {
    pub fn new(cfg: &'a ScoringConfig) -> Self {
        Self {
            freshness: &cfg.freshness,
            rules: &cfg.plausibility,
        }
    }

    pub fn classify(&self, input: QualityInput<'_>) -> QualityAssessment {
        let snap = input.snapshot;
        let mut flags = Vec::new();
        if input.fetch_failed {
            flags.push(QualityFlag::FetchFailed);
        }

        let Some(depth) = snap.base_depth_cm else {
            flags.push(QualityFlag::NoDepthReading);
            return QualityAssessment {
                tier: QualityTier::Unreliable,
                flags,
            };
        };

        let observed_at = snap.observed_at.unwrap_or(snap.fetched_at);
        let age_hours = (input.now - observed_at).num_hours();
        let stale = age_hours >= self.freshness.stale_after_hours;
        if stale {
            flags.push(QualityFlag::DataOlderThan {
                hours: self.freshness.stale_after_hours,
            });
        } else if age_hours >= self.freshness.informational_after_hours {
            flags.push(QualityFlag::DataOlderThan {
                hours: self.freshness.informational_after_hours,
            });
        }

        let mut tier = match (snap.depth_source, snap.secondary_depth_cm) {
            (Some(DepthSource::Station), _) => QualityTier::Verified,
            (Some(DepthSource::Model), Some(_)) => QualityTier::Good,
            _ => {
                flags.push(QualityFlag::NoStationData);
                flags.push(QualityFlag::SingleSourceUnverified);
                QualityTier::Suspect
            }
        };

        self.check_seasonal(input.resort, snap, depth, &mut flags);
        self.check_depth_change(snap, depth, input.previous_depth_cm, &mut flags);
        self.check_cross_source(depth, snap.secondary_depth_cm, &mut flags);
        self.check_temperature(snap, depth, &mut flags);

        if flags.iter().any(QualityFlag::is_rule_failure) {
            tier = tier.min(QualityTier::Suspect);
        }
        if stale {
            tier = QualityTier::Stale;
        }
        QualityAssessment { tier, flags }
    }

    fn check_seasonal(
        &self,
        resort: &Resort,
        snap: &MetricsSnapshot,
        depth: f64,
        flags: &mut Vec<QualityFlag>,
    ) {
        let month = snap.fetched_at.month();
        let off_season = if resort.latitude >= 0.0 {
            (5..=10).contains(&month)
        } else {
            month >= 11 || month <= 4
        };
        if off_season && depth > self.rules.offseason_max_depth_cm {
            flags.push(QualityFlag::DepthImplausibleOffseason);
        }

        if let Some(summit) = resort.elevation_summit_m {
            let max_cm = self
                .rules
                .elevation_caps
                .iter()
                .find(|c| summit <= c.up_to_m)
                .map(|c| c.max_depth_cm)
                .unwrap_or(self.rules.elevation_cap_above_cm);
            if depth > max_cm {
                flags.push(QualityFlag::DepthExceedsElevationMaximum { max_cm });
            }
        }
    }

    fn check_depth_change(
        &self,
        snap: &MetricsSnapshot,
        depth: f64,
        previous: Option<f64>,
        flags: &mut Vec<QualityFlag>,
    ) {
        let Some(prev) = previous else { return };
        let change = depth - prev;
        if change > self.rules.max_unexplained_gain_cm {
            let snowfall = snap.new_snow_24h_cm.unwrap_or(0.0);
            if snowfall < change * self.rules.min_snowfall_explained_ratio {
                flags.push(QualityFlag::DepthGainUnexplainedBySnowfall);
            }
        } else if change < -self.rules.max_loss_cm {
            flags.push(QualityFlag::DepthLossImplausiblyLarge);
        }
    }

    fn check_cross_source(&self, depth: f64, secondary: Option<f64>, flags: &mut Vec<QualityFlag>) {
        let Some(other) = secondary else { return };
        let (lo, hi) = if depth < other { (depth, other) } else { (other, depth) };
        if lo <= 0.0 {
            // one source sees bare ground while the other reports snow
            if hi > 0.0 {
                flags.push(QualityFlag::CrossSourceVariance { ratio: f64::INFINITY });
            }
            return;
        }
        let ratio = hi / lo;
        if ratio > self.rules.cross_source_max_ratio {
            flags.push(QualityFlag::CrossSourceVariance { ratio });
        }
    }

    fn check_temperature(&self, snap: &MetricsSnapshot, depth: f64, flags: &mut Vec<QualityFlag>) {
        if let Some(avg) = snap.avg_temp_72h_c {
            if avg > self.rules.warm_temp_c && depth > self.rules.warm_max_depth_cm {
                flags.push(QualityFlag::HighDepthInconsistentWithWarmTemps);
            }
        }
    }
}
