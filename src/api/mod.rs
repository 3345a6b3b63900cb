// src/api/mod.rs
//! HTTP surface: public read routes plus key-guarded admin routes. Every route
//! is served at the root and again under `/api/v1`.

pub mod admin;
pub mod error;
pub mod public;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::overrides::OverrideStore;
use crate::pipeline::Pipeline;
use crate::scoring::ScoringEngine;
use crate::store::{ConditionsStore, ResortCatalog};

pub use error::{ApiError, ApiResult};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Accepted admin keys. An empty set leaves the admin routes open.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashSet<String>,
}

impl ApiKeys {
    pub fn from_comma_separated(keys_str: &str) -> Self {
        let keys = keys_str
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self { keys }
    }

    pub fn is_open(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ResortCatalog>,
    pub store: Arc<ConditionsStore>,
    pub overrides: Arc<OverrideStore>,
    pub engine: Arc<ScoringEngine>,
    pub pipeline: Arc<Pipeline>,
    pub admin_keys: Arc<ApiKeys>,
    /// Saved after each admin mutation when set.
    pub override_state_path: Option<PathBuf>,
}

async fn require_admin_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.admin_keys.is_open() {
        return Ok(next.run(req).await);
    }
    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if state.admin_keys.is_valid(key) => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized),
    }
}

fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/quality-report", get(admin::quality_report))
        .route("/run-pipeline", post(admin::run_pipeline))
        .route("/set-override", post(admin::set_override))
        .route("/clear-override/{slug}", delete(admin::clear_override))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_key));

    Router::new()
        .route("/health", get(public::health))
        .route("/rankings", get(public::rankings))
        .route("/rankings/map", get(public::rankings_map))
        .route("/resorts/{slug}", get(public::resort_detail))
        .route("/resorts/{slug}/forecast", get(public::resort_forecast))
        .route("/regions", get(public::regions))
        .nest("/admin", admin)
}

pub fn create_router(state: AppState) -> Router {
    if state.admin_keys.is_open() {
        tracing::warn!(target: "api", "no admin keys configured; admin routes are open");
    }
    let routes = routes(&state);
    Router::new()
        .merge(routes.clone())
        .nest("/api/v1", routes)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
