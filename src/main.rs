//! SkiRank service: binary entrypoint.
//! Loads the catalog and tunables, arms the daily pipeline, and serves the API.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skirank::config::AppConfig;
use skirank::metrics::Metrics;
use skirank::pipeline::scheduler::spawn_daily_scheduler;

/// Local subscriber, only when asked for. `SKIRANK_JSON_LOGS=1` wins over
/// `SKIRANK_DEV_TRACING=1`. `try_init` leaves an existing runtime subscriber alone.
fn enable_tracing() {
    let flag = |name: &str| std::env::var(name).ok().is_some_and(|v| v == "1");
    let json = flag("SKIRANK_JSON_LOGS");
    if !(json || flag("SKIRANK_DEV_TRACING")) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline=info,overrides=info,api=info,warn"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // .env in local/dev; no-op in prod.
    let _ = dotenvy::dotenv();
    enable_tracing();

    let cfg = AppConfig::from_env()?;
    let state = skirank::build_state(&cfg).await?;
    tracing::info!(
        target: "api",
        resorts = state.catalog.len(),
        overrides = state.overrides.len(),
        provider = ?cfg.provider,
        "state loaded"
    );

    spawn_daily_scheduler(state.pipeline.clone(), cfg.schedule, cfg.run_on_startup);

    let mut router = skirank::create_router(state.clone());
    if cfg.enable_metrics {
        let metrics = Metrics::init(state.catalog.len())?;
        router = router.merge(metrics.router());
    }

    Ok(router.into())
}
