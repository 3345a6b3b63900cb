// src/api/admin.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::api::{ApiError, ApiResult, AppState};
use crate::overrides::{DepthOverride, OverrideRequest};
use crate::quality::{QualityFlag, QualityTier};

#[derive(Debug, Serialize)]
pub struct ReportedResort {
    name: String,
    slug: String,
    website_url: Option<String>,
    quality: QualityTier,
    flags: Vec<QualityFlag>,
    current_depth_cm: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "override")]
    active_override: Option<DepthOverride>,
}

#[derive(Debug, Serialize)]
pub struct QualityReport {
    quality_summary: BTreeMap<&'static str, usize>,
    total_resorts: usize,
    flagged_resorts: Vec<ReportedResort>,
    overridden_resorts: Vec<ReportedResort>,
    last_pipeline_run: Option<DateTime<Utc>>,
}

pub async fn quality_report(State(state): State<AppState>) -> Json<QualityReport> {
    let run = state.store.latest();
    let mut quality_summary: BTreeMap<&'static str, usize> =
        QualityTier::ALL.iter().map(|t| (t.as_str(), 0)).collect();
    let mut flagged_resorts = Vec::new();
    let mut overridden_resorts = Vec::new();

    for resort in state.catalog.resorts() {
        let Some(c) = run.entry(resort.id) else {
            continue;
        };
        *quality_summary.entry(c.quality.tier.as_str()).or_default() += 1;
        let active_override = state.overrides.get(resort.id);
        let flagged = c.quality.tier.is_flagged();
        if !flagged && active_override.is_none() {
            continue;
        }
        let row = ReportedResort {
            name: resort.name.clone(),
            slug: resort.slug.clone(),
            website_url: resort.website_url.clone(),
            quality: c.quality.tier,
            flags: c.quality.flags.clone(),
            current_depth_cm: c.effective_depth_cm,
            last_updated: c.snapshot.observed_at.or(Some(c.snapshot.fetched_at)),
            active_override,
        };
        if flagged {
            flagged_resorts.push(row);
        } else {
            overridden_resorts.push(row);
        }
    }
    flagged_resorts.sort_by(|a, b| a.name.cmp(&b.name));
    overridden_resorts.sort_by(|a, b| a.name.cmp(&b.name));

    Json(QualityReport {
        quality_summary,
        total_resorts: state.catalog.len(),
        flagged_resorts,
        overridden_resorts,
        last_pipeline_run: run.completed_at,
    })
}

#[derive(Serialize)]
pub struct Ack {
    status: &'static str,
    message: String,
}

pub async fn run_pipeline(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Ack>)> {
    state.pipeline.spawn_run()?;
    tracing::info!(target: "api", "on-demand pipeline run triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(Ack {
            status: "ok",
            message: "pipeline run started".to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SetOverrideBody {
    resort_slug: String,
    depth_cm: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    threshold_cm: Option<f64>,
}

#[derive(Serialize)]
pub struct SetOverrideResp {
    status: &'static str,
    message: String,
    #[serde(rename = "override")]
    value: DepthOverride,
}

async fn persist(state: &AppState) {
    if let Some(path) = &state.override_state_path {
        if let Err(e) = state.overrides.save_json(path).await {
            tracing::warn!(
                target: "api",
                error = ?e,
                path = %path.display(),
                "persisting overrides failed"
            );
        }
    }
}

pub async fn set_override(
    State(state): State<AppState>,
    body: Result<Json<SetOverrideBody>, JsonRejection>,
) -> ApiResult<Json<SetOverrideResp>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let resort = state
        .catalog
        .by_slug(&body.resort_slug)
        .ok_or_else(|| ApiError::resort_not_found(&body.resort_slug))?;

    let value = state.overrides.set(
        resort.id,
        OverrideRequest {
            depth_cm: body.depth_cm,
            reason: body.reason,
            threshold_cm: body.threshold_cm,
        },
        Utc::now(),
    )?;
    persist(&state).await;

    Ok(Json(SetOverrideResp {
        status: "ok",
        message: format!(
            "Override set for {}: {}cm (expires after {}cm new snow)",
            resort.slug, value.depth_cm, value.threshold_cm
        ),
        value,
    }))
}

#[derive(Serialize)]
pub struct ClearOverrideResp {
    status: &'static str,
    message: String,
    cleared: bool,
}

/// Clearing a resort without an override is a no-op that still succeeds.
pub async fn clear_override(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ClearOverrideResp>> {
    let resort = state
        .catalog
        .by_slug(&slug)
        .ok_or_else(|| ApiError::resort_not_found(&slug))?;
    let cleared = state.overrides.clear(resort.id);
    if cleared {
        persist(&state).await;
    }
    Ok(Json(ClearOverrideResp {
        status: "ok",
        message: format!("Override cleared for {}", resort.slug),
        cleared,
    }))
}
