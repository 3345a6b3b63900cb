// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod overrides;
pub mod persist;
pub mod pipeline;
pub mod quality;
pub mod ranking;
pub mod scoring;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiKeys, AppState};
use crate::config::{AppConfig, ProviderKind, ScoringConfig};
use crate::ingest::providers::{
    FixtureProvider, OpenMeteoProvider, StationEnrichedProvider, StationMap, SynopticClient,
};
use crate::ingest::MetricsProvider;
use crate::overrides::OverrideStore;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::scoring::ScoringEngine;
use crate::store::{ConditionsStore, ResortCatalog};

pub use crate::api::create_router;

fn build_provider(cfg: &AppConfig) -> Result<Arc<dyn MetricsProvider>> {
    let primary: Arc<dyn MetricsProvider> = match cfg.provider {
        ProviderKind::OpenMeteo => Arc::new(OpenMeteoProvider::new(
            cfg.open_meteo_base_url.clone(),
            std::time::Duration::from_secs(cfg.fetch_timeout_secs),
        )?),
        ProviderKind::Fixture => {
            let path = cfg
                .fixture_path
                .as_deref()
                .context("fixture provider selected but SKIRANK_FIXTURE_PATH is unset")?;
            Arc::new(FixtureProvider::from_path(path)?)
        }
    };

    let Some(token) = &cfg.synoptic_api_token else {
        return Ok(primary);
    };
    let map = StationMap::load_or_empty(&cfg.station_map_path)?;
    if map.is_empty() {
        return Ok(primary);
    }
    tracing::info!(
        target: "ingest",
        stations = map.len(),
        primary = primary.name(),
        "station depth enrichment enabled"
    );
    let stations = SynopticClient::new(
        cfg.synoptic_api_url.clone(),
        token.clone(),
        std::time::Duration::from_secs(cfg.fetch_timeout_secs),
    )?;
    Ok(Arc::new(StationEnrichedProvider::new(primary, Arc::new(stations), map)))
}

/// Assemble shared state from already-loaded parts.
pub fn assemble_state(
    catalog: ResortCatalog,
    scoring: ScoringConfig,
    provider: Arc<dyn MetricsProvider>,
    settings: PipelineSettings,
    admin_keys: ApiKeys,
) -> AppState {
    let catalog = Arc::new(catalog);
    let store = Arc::new(ConditionsStore::new());
    let overrides = Arc::new(OverrideStore::new(scoring.overrides.clone()));
    let engine = Arc::new(ScoringEngine::new(scoring));
    let override_state_path = settings.override_state_path.clone();
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&catalog),
        provider,
        Arc::clone(&overrides),
        Arc::clone(&store),
        Arc::clone(&engine),
        settings,
    ));
    AppState {
        catalog,
        store,
        overrides,
        engine,
        pipeline,
        admin_keys: Arc::new(admin_keys),
        override_state_path,
    }
}

/// Bring back what the previous process persisted: active overrides and the
/// last completed run.
pub async fn restore_state(state: &AppState) -> Result<()> {
    if let Some(path) = &state.override_state_path {
        let restored = state.overrides.load_json(path).await?;
        tracing::info!(target: "overrides", restored, path = %path.display(), "overrides loaded");
    }
    state
        .pipeline
        .restore_last_run()
        .await
        .context("restoring last run")?;
    Ok(())
}

/// Load catalog, scoring tunables and persisted state, and wire the pipeline.
pub async fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let scoring = ScoringConfig::load_default().context("loading scoring config")?;
    let catalog = ResortCatalog::load_from_path(&cfg.catalog_path)?;
    let provider = build_provider(cfg)?;
    let state = assemble_state(
        catalog,
        scoring,
        provider,
        PipelineSettings::from_config(cfg),
        ApiKeys::from_comma_separated(&cfg.admin_api_keys),
    );

    restore_state(&state).await?;
    Ok(state)
}
