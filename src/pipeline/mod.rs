// src/pipeline/mod.rs
//! The daily run: fetch, snapshot, classify, tick overrides, score, publish.
//!
//! Resorts fan out over a `JoinSet` bounded by a semaphore. Stages for a single
//! resort run strictly in order. The finished run replaces the published one
//! in a single swap, so readers never see a half-built run.

pub mod scheduler;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::AppConfig;
use crate::error::{OverrideError, PipelineError};
use crate::ingest::retry::retry_budget;
use crate::ingest::MetricsProvider;
use crate::model::{MetricsSnapshot, PerHorizon, Resort};
use crate::overrides::{OverrideStore, TickOutcome};
use crate::persist;
use crate::quality::{QualityClassifier, QualityInput};
use crate::scoring::ScoringEngine;
use crate::store::{ConditionsStore, ResortCatalog, ResortConditions, RunMarker, RunSnapshot};

/// Failure share above which a finished run logs a warning.
pub const FAILURE_ALERT_RATE: f64 = 0.05;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!(
            "pipeline_resort_failures_total",
            "Resorts whose fetch failed or timed out."
        );
        describe_counter!(
            "overrides_expired_total",
            "Overrides removed by accumulated new snow."
        );
        describe_counter!(
            "override_tick_conflicts_total",
            "Ticks dropped because an operator write landed first."
        );
        describe_gauge!("pipeline_last_run_ts", "Unix ts of the last completed run.");
        describe_histogram!("pipeline_duration_ms", "Wall time of a full run in milliseconds.");
    });
}

/// New snow attributable to this run, from the trailing 24h and 72h totals.
///
/// Up to a day since the last completed run, the 24h total is scaled by the
/// share of the day. Between one and three days, the 72h total fills in the
/// older part of the gap. From three days on the whole 72h total counts. With
/// no previous run only the last 24h counts. A missing 72h total falls back to
/// the 24h one.
pub fn snowfall_since_last_run(
    new_snow_24h_cm: Option<f64>,
    new_snow_72h_cm: Option<f64>,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let clean = |v: Option<f64>| v.filter(|v| v.is_finite()).map(|v| v.max(0.0));
    let s24 = clean(new_snow_24h_cm).unwrap_or(0.0);
    let s72 = clean(new_snow_72h_cm).unwrap_or(s24).max(s24);
    let Some(prev) = last_run_at else {
        return s24;
    };
    let hours = ((now - prev).num_seconds() as f64 / 3600.0).max(0.0);
    if hours <= 24.0 {
        s24 * hours / 24.0
    } else if hours < 72.0 {
        s24 + (s72 - s24) * (hours - 24.0) / 48.0
    } else {
        s72
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    /// Bound on one resort's whole fetch, provider retries included.
    pub fetch_timeout: Duration,
    /// Where overrides are saved after a run. `None` keeps them in memory only.
    pub override_state_path: Option<PathBuf>,
    /// Where the last completed run is recorded. `None` keeps it in memory only.
    pub run_state_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            fetch_timeout: retry_budget(Duration::from_secs(30)),
            override_state_path: None,
            run_state_path: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            concurrency: cfg.pipeline_concurrency.max(1),
            fetch_timeout: retry_budget(Duration::from_secs(cfg.fetch_timeout_secs)),
            override_state_path: cfg.override_state_path.clone(),
            run_state_path: cfg.run_state_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: u64,
    pub resorts: usize,
    pub failed: usize,
    pub overrides_expired: usize,
    pub tick_conflicts: usize,
    pub duration_ms: u64,
}

/// Clears the run flag on drop, including when the run task panics.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ResortOutcome {
    conditions: ResortConditions,
    fetch_failed: bool,
    expired: bool,
    conflict: bool,
}

pub struct Pipeline {
    catalog: Arc<ResortCatalog>,
    provider: Arc<dyn MetricsProvider>,
    overrides: Arc<OverrideStore>,
    store: Arc<ConditionsStore>,
    engine: Arc<ScoringEngine>,
    settings: PipelineSettings,
    running: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<ResortCatalog>,
        provider: Arc<dyn MetricsProvider>,
        overrides: Arc<OverrideStore>,
        store: Arc<ConditionsStore>,
        engine: Arc<ScoringEngine>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalog,
            provider,
            overrides,
            store,
            engine,
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Seed the run clock from a persisted marker. Returns whether one was found.
    pub async fn restore_last_run(&self) -> anyhow::Result<bool> {
        let Some(path) = &self.settings.run_state_path else {
            return Ok(false);
        };
        let Some(marker) = persist::read_json_if_exists::<RunMarker>(path).await? else {
            return Ok(false);
        };
        tracing::info!(
            target: "pipeline",
            run_id = marker.run_id,
            completed_at = %marker.completed_at,
            resorts = marker.base_depths_cm.len(),
            "last run restored"
        );
        self.store.restore(marker);
        Ok(true)
    }

    /// Run to completion in the caller's task.
    pub async fn run_once(self: &Arc<Self>) -> Result<RunReport, PipelineError> {
        self.run_once_at(Utc::now()).await
    }

    pub async fn run_once_at(
        self: &Arc<Self>,
        now: DateTime<Utc>,
    ) -> Result<RunReport, PipelineError> {
        let _guard = RunGuard::acquire(&self.running)?;
        Ok(self.execute(now).await)
    }

    /// Claim the run flag now and run in the background. A second trigger while
    /// the first is in flight is rejected here, not inside the task.
    pub fn spawn_run(self: &Arc<Self>) -> Result<JoinHandle<()>, PipelineError> {
        let guard = RunGuard::acquire(&self.running)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            this.execute(Utc::now()).await;
        }))
    }

    async fn execute(self: &Arc<Self>, now: DateTime<Utc>) -> RunReport {
        ensure_metrics_described();
        let t0 = Instant::now();
        let previous = self.store.latest();
        // runs are exclusive, so the published id is the last one handed out
        let run_id = previous.run_id + 1;
        let last_run_at = previous.completed_at;

        tracing::info!(
            target: "pipeline",
            run_id,
            resorts = self.catalog.len(),
            provider = self.provider.name(),
            "pipeline run started"
        );

        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for resort in self.catalog.resorts() {
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let resort = resort.clone();
            let previous_depth_cm = previous.base_depth_cm(resort.id);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                this.process_resort(&resort, previous_depth_cm, last_run_at, now)
                    .await
            });
        }

        let mut report = RunReport {
            run_id,
            resorts: self.catalog.len(),
            ..RunReport::default()
        };
        let mut entries = std::collections::HashMap::with_capacity(self.catalog.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.failed += usize::from(outcome.fetch_failed);
                    report.overrides_expired += usize::from(outcome.expired);
                    report.tick_conflicts += usize::from(outcome.conflict);
                    entries.insert(outcome.conditions.resort_id, outcome.conditions);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "pipeline", run_id, error = %e, "resort task aborted");
                }
            }
        }

        let elapsed =
            chrono::Duration::from_std(t0.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        let completed_at = now + elapsed;
        let run = RunSnapshot {
            run_id,
            started_at: Some(now),
            completed_at: Some(completed_at),
            failed_resorts: report.failed,
            entries,
            restored_depths_cm: Default::default(),
        };
        let marker = run.marker();
        self.store.publish(run);

        if let (Some(path), Some(marker)) = (&self.settings.run_state_path, marker) {
            if let Err(e) = persist::write_json_atomic(path, &marker).await {
                tracing::warn!(
                    target: "pipeline",
                    error = ?e,
                    path = %path.display(),
                    "persisting last run failed"
                );
            }
        }

        if let Some(path) = &self.settings.override_state_path {
            if let Err(e) = self.overrides.save_json(path).await {
                tracing::warn!(
                    target: "pipeline",
                    error = ?e,
                    path = %path.display(),
                    "persisting overrides failed"
                );
            }
        }

        report.duration_ms = t0.elapsed().as_millis() as u64;
        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_resort_failures_total").increment(report.failed as u64);
        counter!("overrides_expired_total").increment(report.overrides_expired as u64);
        gauge!("pipeline_last_run_ts").set(completed_at.timestamp() as f64);
        histogram!("pipeline_duration_ms").record(report.duration_ms as f64);

        let failure_rate = if report.resorts == 0 {
            0.0
        } else {
            report.failed as f64 / report.resorts as f64
        };
        if failure_rate > FAILURE_ALERT_RATE {
            tracing::warn!(
                target: "pipeline",
                run_id,
                failed = report.failed,
                resorts = report.resorts,
                "failure rate above alert threshold"
            );
        }
        tracing::info!(
            target: "pipeline",
            run_id,
            resorts = report.resorts,
            failed = report.failed,
            overrides_expired = report.overrides_expired,
            tick_conflicts = report.tick_conflicts,
            duration_ms = report.duration_ms,
            "pipeline run finished"
        );
        report
    }

    async fn process_resort(
        &self,
        resort: &Resort,
        previous_depth_cm: Option<f64>,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ResortOutcome {
        let fetch = self.provider.fetch(resort, now);
        let fetched = match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(f)) => Some(f),
            Ok(Err(e)) => {
                tracing::warn!(target: "pipeline", resort = %resort.slug, error = ?e, "fetch failed");
                None
            }
            Err(_) => {
                tracing::warn!(target: "pipeline", resort = %resort.slug, "fetch timed out");
                None
            }
        };
        let fetch_failed = fetched.is_none();
        let snapshot = match fetched {
            Some(f) => MetricsSnapshot::from_fetched(f, now),
            None => MetricsSnapshot::unavailable(now),
        };

        let quality = QualityClassifier::new(self.engine.config()).classify(QualityInput {
            resort,
            snapshot: &snapshot,
            previous_depth_cm,
            fetch_failed,
            now,
        });

        let new_snow_cm = snowfall_since_last_run(
            snapshot.new_snow_24h_cm,
            snapshot.new_snow_72h_cm,
            last_run_at,
            now,
        );
        let (expired, conflict) = self.tick_override(resort, new_snow_cm);

        let override_depth = self.overrides.get(resort.id).map(|o| o.depth_cm);
        let effective_depth_cm = override_depth.or(snapshot.base_depth_cm);
        let scores =
            PerHorizon::from_fn(|h| self.engine.score_horizon(&snapshot, effective_depth_cm, h));

        tracing::debug!(
            target: "pipeline",
            resort = %resort.slug,
            quality = %quality.tier,
            effective_depth_cm,
            score_now = scores.now.score,
            "resort processed"
        );

        ResortOutcome {
            conditions: ResortConditions {
                resort_id: resort.id,
                snapshot,
                effective_depth_cm,
                override_applied: override_depth.is_some(),
                quality,
                scores,
            },
            fetch_failed,
            expired,
            conflict,
        }
    }

    /// Returns `(expired, conflict)`.
    fn tick_override(&self, resort: &Resort, new_snow_cm: f64) -> (bool, bool) {
        let (version, active) = self.overrides.observe(resort.id);
        if active.is_none() {
            return (false, false);
        }
        match self.overrides.tick(resort.id, new_snow_cm, version) {
            Ok(Some(TickOutcome::Expired { .. })) => (true, false),
            Ok(_) => (false, false),
            Err(OverrideError::VersionConflict { expected, found, .. }) => {
                counter!("override_tick_conflicts_total").increment(1);
                tracing::warn!(
                    target: "pipeline",
                    resort = %resort.slug,
                    expected,
                    found,
                    "override changed during run; tick dropped"
                );
                (false, true)
            }
            Err(e) => {
                tracing::warn!(
                    target: "pipeline",
                    resort = %resort.slug,
                    error = %e,
                    "override tick failed"
                );
                (false, false)
            }
        }
    }
}
