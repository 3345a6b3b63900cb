// src/store.rs
//! Reference catalog plus the atomically published latest run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::hierarchy;
use crate::model::{MetricsSnapshot, PerHorizon, Resort, ResortId};
use crate::quality::QualityAssessment;
use crate::scoring::HorizonScore;

#[derive(Debug, Default)]
pub struct ResortCatalog {
    resorts: Vec<Resort>,
    by_slug: HashMap<String, usize>,
    by_id: HashMap<ResortId, usize>,
}

fn is_url_safe(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl ResortCatalog {
    /// Validates slugs and ids, and classifies each resort geographically.
    pub fn new(resorts: Vec<Resort>) -> Result<Self, CatalogError> {
        let mut by_slug = HashMap::with_capacity(resorts.len());
        let mut by_id = HashMap::with_capacity(resorts.len());
        let mut out = Vec::with_capacity(resorts.len());
        for (i, mut r) in resorts.into_iter().enumerate() {
            if !is_url_safe(&r.slug) {
                return Err(CatalogError::InvalidSlug(r.slug));
            }
            if by_slug.insert(r.slug.clone(), i).is_some() {
                return Err(CatalogError::DuplicateSlug(r.slug));
            }
            if by_id.insert(r.id, i).is_some() {
                return Err(CatalogError::DuplicateId(r.id));
            }
            hierarchy::classify(&mut r);
            out.push(r);
        }
        Ok(Self {
            resorts: out,
            by_slug,
            by_id,
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let resorts: Vec<Resort> = serde_json::from_str(s).context("parsing resort catalog")?;
        Ok(Self::new(resorts)?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading resort catalog {}", path.display()))?;
        Self::from_json_str(&content)
    }

    pub fn resorts(&self) -> &[Resort] {
        &self.resorts
    }

    pub fn len(&self) -> usize {
        self.resorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resorts.is_empty()
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Resort> {
        self.by_slug.get(slug).and_then(|&i| self.resorts.get(i))
    }

    pub fn by_id(&self, id: ResortId) -> Option<&Resort> {
        self.by_id.get(&id).and_then(|&i| self.resorts.get(i))
    }
}

/// Everything one run produced for one resort.
#[derive(Debug, Clone)]
pub struct ResortConditions {
    pub resort_id: ResortId,
    pub snapshot: MetricsSnapshot,
    /// Depth after override resolution.
    pub effective_depth_cm: Option<f64>,
    pub override_applied: bool,
    pub quality: QualityAssessment,
    pub scores: PerHorizon<HorizonScore>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub run_id: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_resorts: usize,
    pub entries: HashMap<ResortId, ResortConditions>,
    /// Base depths carried over from a persisted run, for resorts with no entry.
    pub restored_depths_cm: HashMap<ResortId, f64>,
}

impl RunSnapshot {
    pub fn entry(&self, id: ResortId) -> Option<&ResortConditions> {
        self.entries.get(&id)
    }

    /// Measured base depth this run left for `id`, for the next run's
    /// day-over-day checks.
    pub fn base_depth_cm(&self, id: ResortId) -> Option<f64> {
        match self.entries.get(&id) {
            Some(c) => c.snapshot.base_depth_cm,
            None => self.restored_depths_cm.get(&id).copied(),
        }
    }

    /// What survives a restart. `None` until a run has completed.
    pub fn marker(&self) -> Option<RunMarker> {
        let completed_at = self.completed_at?;
        let mut base_depths_cm = self.restored_depths_cm.clone();
        base_depths_cm.retain(|id, _| !self.entries.contains_key(id));
        base_depths_cm.extend(
            self.entries
                .values()
                .filter_map(|c| c.snapshot.base_depth_cm.map(|d| (c.resort_id, d))),
        );
        Some(RunMarker {
            run_id: self.run_id,
            completed_at,
            base_depths_cm,
        })
    }
}

/// The last completed run as persisted in `state/last_run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMarker {
    pub run_id: u64,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub base_depths_cm: HashMap<ResortId, f64>,
}

/// Readers clone the `Arc` and work on a consistent run; the pipeline swaps in
/// a complete new run at the end.
#[derive(Debug, Default)]
pub struct ConditionsStore {
    latest: RwLock<Arc<RunSnapshot>>,
}

impl ConditionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Arc<RunSnapshot> {
        Arc::clone(&self.latest.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn publish(&self, run: RunSnapshot) {
        let mut guard = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(run);
    }

    /// Seed after a restart: the run clock and depths come back, the scored
    /// entries only with the next run.
    pub fn restore(&self, marker: RunMarker) {
        self.publish(RunSnapshot {
            run_id: marker.run_id,
            completed_at: Some(marker.completed_at),
            restored_depths_cm: marker.base_depths_cm,
            ..RunSnapshot::default()
        });
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.latest().completed_at
    }
}
