// tests/api_http.rs
//
// HTTP-level tests for the Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, /rankings (+ validation, filters, caller weights), /rankings/map
// - GET /resorts/{slug}, /resorts/{slug}/forecast, /regions
// - admin key guard, set/clear override, quality report
// - /api/v1 nesting

mod support;

use std::collections::HashMap;

use serde_json::json;
use shuttle_axum::axum::http::StatusCode;

use support::{admin_request, get_json, harness, station, model_only, winter_now, Harness, ADMIN_KEY};

/// tignes (FR, station), vail (US/Colorado, model only), niseko (JP, station),
/// ghost (FR, no fixture, so the fetch fails).
async fn seeded() -> Harness {
    let now = winter_now();
    let resorts = vec![
        support::resort("tignes", "FR", None, Some("Savoie")),
        support::resort("vail", "US", Some("Rocky Mountains"), Some("Colorado")),
        support::resort("niseko", "JP", Some("Hokkaido"), None),
        support::resort("ghost", "FR", None, None),
    ];
    let mut conditions = HashMap::new();
    conditions.insert("tignes".to_string(), station(185.0, 10.0, now));
    conditions.insert("vail".to_string(), model_only(120.0, now));
    conditions.insert("niseko".to_string(), station(290.0, 25.0, now));

    let h = harness(resorts, conditions);
    h.state
        .pipeline
        .run_once_at(now)
        .await
        .expect("pipeline idle");
    h
}

fn slugs(v: &serde_json::Value) -> Vec<String> {
    v["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|r| r["resort"]["slug"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_catalog_and_last_run() {
    let h = harness(vec![support::resort("tignes", "FR", None, None)], HashMap::new());

    let (status, body) = get_json(&h.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["resorts_count"], 1);
    assert!(body["last_pipeline_run"].is_null(), "no run yet");

    h.state.pipeline.run_once_at(winter_now()).await.unwrap();
    let (_, body) = get_json(&h.router, "/api/v1/health").await;
    assert!(body["last_pipeline_run"].is_string());
}

#[tokio::test]
async fn rankings_sort_scored_first_and_nulls_last() {
    let h = seeded().await;

    let (status, body) = get_json(&h.router, "/rankings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 4);
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["meta"]["per_page"], 50);
    assert_eq!(body["meta"]["total_pages"], 1);
    assert_eq!(body["meta"]["horizon_days"], 0);
    assert!(body["generated_at"].is_string());

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r["rank"], i + 1);
    }
    let last = &results[3];
    assert_eq!(last["resort"]["slug"], "ghost");
    assert!(last["score"].is_null());
    assert_eq!(last["quality"], "unreliable");
    assert!(last["quality_flags"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "fetch_failed"));

    let scores: Vec<f64> = results[..3]
        .iter()
        .map(|r| r["score"].as_f64().expect("scored"))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "descending: {scores:?}");
}

#[tokio::test]
async fn rankings_reject_bad_parameters() {
    let h = seeded().await;
    for uri in [
        "/rankings?horizon_days=5",
        "/rankings?per_page=0",
        "/rankings?per_page=101",
        "/rankings?page=0",
        "/rankings?sort=alphabetical",
        "/rankings?horizon_days=soon",
        "/rankings?w_wind=2",
    ] {
        let (status, body) = get_json(&h.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri} should carry an error message");
    }
}

#[tokio::test]
async fn rankings_filters_by_geography() {
    let h = seeded().await;

    let (_, body) = get_json(&h.router, "/rankings?country=us").await;
    assert_eq!(slugs(&body), vec!["vail"]);

    let (_, body) = get_json(&h.router, "/rankings?continent=europe").await;
    assert_eq!(body["meta"]["total"], 2);

    let (_, body) = get_json(&h.router, "/rankings?ski_region=french-alps,hokkaido").await;
    assert_eq!(body["meta"]["total"], 3);

    let (_, body) = get_json(&h.router, "/rankings?subregion=colorado").await;
    assert_eq!(slugs(&body), vec!["vail"]);
}

#[tokio::test]
async fn caller_weights_rerank_through_the_shared_composite() {
    let h = seeded().await;
    let uri = "/rankings?w_base_depth=1&w_fresh_snow=0&w_temperature=0&w_wind=0&w_forecast=0";
    let (status, body) = get_json(&h.router, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slugs(&body), vec!["niseko", "tignes", "vail", "ghost"]);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["score"].as_f64(), Some(100.0));
    assert!((results[1]["score"].as_f64().unwrap() - 92.5).abs() < 1e-9);
    assert!((results[2]["score"].as_f64().unwrap() - 60.0).abs() < 1e-9);
}

#[tokio::test]
async fn rankings_map_lists_current_resorts_by_slug() {
    let h = seeded().await;
    let (status, body) = get_json(&h.router, "/rankings/map?horizon_days=3").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ghost", "niseko", "tignes", "vail"]);
    assert!(body[0]["lat"].is_number());
    assert!(body[0]["score"].is_null());
}

#[tokio::test]
async fn resort_detail_and_forecast() {
    let h = seeded().await;

    let (status, body) = get_json(&h.router, "/resorts/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nowhere"));

    let (status, body) = get_json(&h.router, "/resorts/tignes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resort"]["slug"], "tignes");
    assert_eq!(body["quality"], "verified");
    assert_eq!(body["depth_source"], "station");
    assert_eq!(body["horizons"].as_array().unwrap().len(), 4);
    assert!(body["score"].is_number());

    let (status, body) = get_json(&h.router, "/resorts/tignes/forecast").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slug"], "tignes");
    assert!(body["days"].as_array().unwrap().is_empty());

    let (status, _) = get_json(&h.router, "/resorts/nowhere/forecast").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resort_without_a_run_has_null_score() {
    let h = harness(vec![support::resort("tignes", "FR", None, None)], HashMap::new());
    let (status, body) = get_json(&h.router, "/resorts/tignes").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["score"].is_null());
    assert!(body["forecast"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn regions_counts_sum_to_current_resorts() {
    let h = seeded().await;
    let (status, body) = get_json(&h.router, "/regions").await;
    assert_eq!(status, StatusCode::OK);

    let continents = body["continents"].as_array().unwrap();
    let total: u64 = continents
        .iter()
        .map(|c| c["resort_count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 4);
    assert_eq!(continents[0]["label"], "North America");
    for c in continents {
        let by_region: u64 = c["ski_regions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["resort_count"].as_u64().unwrap())
            .sum();
        let by_country: u64 = c["countries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["resort_count"].as_u64().unwrap())
            .sum();
        assert_eq!(by_region, c["resort_count"].as_u64().unwrap());
        assert_eq!(by_country, c["resort_count"].as_u64().unwrap());
    }
}

#[tokio::test]
async fn admin_routes_require_a_valid_key() {
    let h = seeded().await;

    let (status, body) = admin_request(&h.router, "GET", "/admin/quality-report", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) =
        admin_request(&h.router, "GET", "/admin/quality-report", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        admin_request(&h.router, "GET", "/api/v1/admin/quality-report", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_are_open_without_configured_keys() {
    let h = support::harness_with(vec![support::resort("tignes", "FR", None, None)], HashMap::new(), "");
    let (status, _) = admin_request(&h.router, "GET", "/admin/quality-report", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn quality_report_lists_flagged_and_overridden() {
    let h = seeded().await;
    let (status, _) = admin_request(
        &h.router,
        "POST",
        "/admin/set-override",
        Some(ADMIN_KEY),
        Some(json!({ "resort_slug": "tignes", "depth_cm": 150.0, "reason": "groomer report" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        admin_request(&h.router, "GET", "/admin/quality-report", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_resorts"], 4);
    assert_eq!(body["quality_summary"]["verified"], 2);
    assert_eq!(body["quality_summary"]["suspect"], 1);
    assert_eq!(body["quality_summary"]["unreliable"], 1);
    assert_eq!(body["quality_summary"]["stale"], 0);

    let flagged: Vec<&str> = body["flagged_resorts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["slug"].as_str().unwrap())
        .collect();
    assert_eq!(flagged, vec!["ghost", "vail"], "sorted by name");

    let overridden = body["overridden_resorts"].as_array().unwrap();
    assert_eq!(overridden.len(), 1);
    assert_eq!(overridden[0]["slug"], "tignes");
    assert_eq!(overridden[0]["override"]["depth_cm"], 150.0);
    assert!(body["last_pipeline_run"].is_string());
}

#[tokio::test]
async fn set_override_validates_input() {
    let h = seeded().await;
    let cases = [
        (json!({ "resort_slug": "atlantis", "depth_cm": 100.0 }), StatusCode::NOT_FOUND),
        (json!({ "resort_slug": "tignes", "depth_cm": 0.0 }), StatusCode::BAD_REQUEST),
        (json!({ "resort_slug": "tignes", "depth_cm": 90.0, "threshold_cm": 2.0 }), StatusCode::BAD_REQUEST),
        (json!({ "depth_cm": 90.0 }), StatusCode::BAD_REQUEST),
    ];
    for (payload, expected) in cases {
        let (status, body) = admin_request(
            &h.router,
            "POST",
            "/admin/set-override",
            Some(ADMIN_KEY),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, expected, "{payload}");
        assert!(body["error"].is_string());
    }
    assert!(h.state.overrides.is_empty(), "rejected input leaves no state");
}

#[tokio::test]
async fn set_then_clear_override() {
    let h = seeded().await;
    let (status, body) = admin_request(
        &h.router,
        "POST",
        "/admin/set-override",
        Some(ADMIN_KEY),
        Some(json!({ "resort_slug": "vail", "depth_cm": 185.0, "threshold_cm": 20.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["override"]["threshold_cm"], 20.0);
    assert_eq!(body["override"]["cumulative_new_snow_cm"], 0.0);
    assert_eq!(body["override"]["reason"], "");

    // takes effect on the next run
    h.state.pipeline.run_once_at(winter_now()).await.unwrap();
    let (_, body) = get_json(&h.router, "/resorts/vail").await;
    assert_eq!(body["depth_source"], "manual_override");
    assert_eq!(body["override_active"], true);
    assert_eq!(body["snapshot"]["base_depth_cm"], 185.0);

    let (status, body) =
        admin_request(&h.router, "DELETE", "/admin/clear-override/vail", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (status, body) =
        admin_request(&h.router, "DELETE", "/admin/clear-override/vail", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK, "clearing twice is a no-op");
    assert_eq!(body["cleared"], false);

    let (status, _) =
        admin_request(&h.router, "DELETE", "/admin/clear-override/atlantis", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
