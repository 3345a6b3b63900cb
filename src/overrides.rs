// src/overrides.rs
//! Operator depth overrides that expire on accumulated snowfall.
//!
//! Each resort has its own slot behind its own mutex, so writes to different
//! resorts never contend. Every slot carries a version that is bumped by each
//! write. The pipeline reads `(version, override)` first and ticks with that
//! version; if an operator `set`/`clear` landed in between, the tick is rejected
//! with `OverrideError::VersionConflict` and the operator's write stands.
//! Expiry happens under the slot lock, so readers see either the full override
//! or none.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::scoring::{OverrideDefaults, OVERRIDE_THRESHOLD_FLOOR_CM};
use crate::error::OverrideError;
use crate::model::ResortId;
use crate::persist;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthOverride {
    pub depth_cm: f64,
    #[serde(default)]
    pub reason: String,
    pub set_at: DateTime<Utc>,
    pub threshold_cm: f64,
    pub cumulative_new_snow_cm: f64,
}

/// Operator input for `set`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OverrideRequest {
    pub depth_cm: f64,
    #[serde(default)]
    pub reason: String,
    /// Falls back to the configured default.
    #[serde(default)]
    pub threshold_cm: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverrideVersion(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Snow was added; the override is still active.
    Accumulated { cumulative_cm: f64, threshold_cm: f64 },
    /// Threshold reached; the override is gone.
    Expired { cumulative_cm: f64, threshold_cm: f64 },
}

#[derive(Debug, Default)]
struct Slot {
    version: u64,
    active: Option<DepthOverride>,
}

#[derive(Debug)]
pub struct OverrideStore {
    slots: RwLock<HashMap<ResortId, Arc<Mutex<Slot>>>>,
    defaults: OverrideDefaults,
    /// Admin writes and the pipeline both save; one at a time, each with a
    /// snapshot taken under the lock.
    save_lock: tokio::sync::Mutex<()>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OverrideStore {
    pub fn new(defaults: OverrideDefaults) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            defaults,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn defaults(&self) -> &OverrideDefaults {
        &self.defaults
    }

    fn existing_slot(&self, id: ResortId) -> Option<Arc<Mutex<Slot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Get-or-create. The map lock is only held long enough to clone the Arc.
    fn slot(&self, id: ResortId) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.existing_slot(id) {
            return slot;
        }
        let mut map = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(id).or_default())
    }

    fn validate(&self, req: &OverrideRequest) -> Result<f64, OverrideError> {
        if !(req.depth_cm.is_finite() && req.depth_cm > 0.0) {
            return Err(OverrideError::InvalidDepth(req.depth_cm));
        }
        let threshold = req.threshold_cm.unwrap_or(self.defaults.default_threshold_cm);
        let min = self.defaults.min_threshold_cm.max(OVERRIDE_THRESHOLD_FLOOR_CM);
        if !(threshold.is_finite() && threshold >= min) {
            return Err(OverrideError::InvalidThreshold { got: threshold, min });
        }
        Ok(threshold)
    }

    /// Create or replace. Resets the accumulated snow and `set_at`.
    pub fn set(
        &self,
        id: ResortId,
        req: OverrideRequest,
        now: DateTime<Utc>,
    ) -> Result<DepthOverride, OverrideError> {
        let threshold_cm = self.validate(&req)?;
        let ov = DepthOverride {
            depth_cm: req.depth_cm,
            reason: req.reason.trim().to_string(),
            set_at: now,
            threshold_cm,
            cumulative_new_snow_cm: 0.0,
        };
        let slot = self.slot(id);
        let mut guard = lock(&slot);
        guard.version += 1;
        guard.active = Some(ov.clone());
        tracing::info!(
            target: "overrides",
            resort_id = %id,
            depth_cm = ov.depth_cm,
            threshold_cm = ov.threshold_cm,
            "override set"
        );
        Ok(ov)
    }

    /// Returns whether an override was removed. Clearing nothing is not an error.
    pub fn clear(&self, id: ResortId) -> bool {
        let Some(slot) = self.existing_slot(id) else {
            return false;
        };
        let mut guard = lock(&slot);
        if guard.active.take().is_none() {
            return false;
        }
        guard.version += 1;
        tracing::info!(target: "overrides", resort_id = %id, "override cleared");
        true
    }

    pub fn get(&self, id: ResortId) -> Option<DepthOverride> {
        let slot = self.existing_slot(id)?;
        let guard = lock(&slot);
        guard.active.clone()
    }

    /// Version-stamped read used by the pipeline before `tick`.
    pub fn observe(&self, id: ResortId) -> (OverrideVersion, Option<DepthOverride>) {
        match self.existing_slot(id) {
            Some(slot) => {
                let guard = lock(&slot);
                (OverrideVersion(guard.version), guard.active.clone())
            }
            None => (OverrideVersion(0), None),
        }
    }

    /// Adds a run's new snow. Reaching the threshold deletes the override in the
    /// same critical section. Returns `Ok(None)` when no override is active.
    pub fn tick(
        &self,
        id: ResortId,
        new_snow_cm: f64,
        expected: OverrideVersion,
    ) -> Result<Option<TickOutcome>, OverrideError> {
        let Some(slot) = self.existing_slot(id) else {
            return if expected.0 == 0 {
                Ok(None)
            } else {
                Err(OverrideError::VersionConflict {
                    resort_id: id,
                    expected: expected.0,
                    found: 0,
                })
            };
        };
        let mut guard = lock(&slot);
        if guard.version != expected.0 {
            return Err(OverrideError::VersionConflict {
                resort_id: id,
                expected: expected.0,
                found: guard.version,
            });
        }
        let snow = if new_snow_cm.is_finite() { new_snow_cm.max(0.0) } else { 0.0 };
        let Some(active) = guard.active.as_mut() else {
            return Ok(None);
        };
        active.cumulative_new_snow_cm += snow;
        let cumulative_cm = active.cumulative_new_snow_cm;
        let threshold_cm = active.threshold_cm;

        guard.version += 1;
        if cumulative_cm >= threshold_cm {
            guard.active = None;
            tracing::info!(
                target: "overrides",
                resort_id = %id,
                cumulative_cm,
                threshold_cm,
                "override expired by new snow"
            );
            Ok(Some(TickOutcome::Expired { cumulative_cm, threshold_cm }))
        } else {
            tracing::debug!(
                target: "overrides",
                resort_id = %id,
                cumulative_cm,
                threshold_cm,
                "override accumulated new snow"
            );
            Ok(Some(TickOutcome::Accumulated { cumulative_cm, threshold_cm }))
        }
    }

    /// Override depth while one is active, otherwise the live reading.
    pub fn effective_depth(&self, id: ResortId, live_depth_cm: Option<f64>) -> Option<f64> {
        self.get(id).map(|o| o.depth_cm).or(live_depth_cm)
    }

    /// All active overrides, ordered by resort id.
    pub fn active(&self) -> Vec<(ResortId, DepthOverride)> {
        let slots: Vec<(ResortId, Arc<Mutex<Slot>>)> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();
        let mut out: Vec<(ResortId, DepthOverride)> = slots
            .into_iter()
            .filter_map(|(id, s)| lock(&s).active.clone().map(|o| (id, o)))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn len(&self) -> usize {
        self.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with previously persisted overrides.
    pub fn restore(&self, entries: Vec<PersistedOverride>) {
        for e in entries {
            let slot = self.slot(e.resort_id);
            let mut guard = lock(&slot);
            guard.version += 1;
            guard.active = Some(e.value);
        }
    }

    pub async fn save_json(&self, path: &Path) -> Result<()> {
        let _serialized = self.save_lock.lock().await;
        let entries: Vec<PersistedOverride> = self
            .active()
            .into_iter()
            .map(|(resort_id, value)| PersistedOverride { resort_id, value })
            .collect();
        persist::write_json_atomic(path, &entries).await
    }

    /// Missing file means no overrides.
    pub async fn load_json(&self, path: &Path) -> Result<usize> {
        let entries: Vec<PersistedOverride> =
            persist::read_json_if_exists(path).await?.unwrap_or_default();
        let n = entries.len();
        self.restore(entries);
        Ok(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOverride {
    pub resort_id: ResortId,
    #[serde(flatten)]
    pub value: DepthOverride,
}
