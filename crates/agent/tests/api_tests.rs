//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fabric_agent::api::{create_router, AppState};
use fabric_core::{probes::components, FabricMetrics, ProbeRegistry};
use std::sync::Arc;
use tower::ServiceExt;

fn setup_test_app() -> (Router, Arc<AppState>) {
    let probes = ProbeRegistry::new();
    let metrics = FabricMetrics::new().unwrap();
    let state = Arc::new(AppState::new(probes, metrics));
    (create_router(state.clone()), state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthz_healthy() {
    let (app, _) = setup_test_app();
    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["components"]["control_loop"].is_object());
    assert!(json["components"]["telemetry"].is_object());
}

#[tokio::test]
async fn test_healthz_degraded_still_ok() {
    let (app, state) = setup_test_app();
    state
        .probes
        .set_degraded(components::TELEMETRY, "3 of 12 links failed to report")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_unhealthy() {
    let (app, state) = setup_test_app();
    state
        .probes
        .set_unhealthy(components::TELEMETRY, "all 12 links failed to report")
        .await;

    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_before_and_after_bootstrap() {
    let (app, state) = setup_test_app();
    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("not yet bootstrapped"));

    state.probes.set_ready(true).await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_readyz_unhealthy_component() {
    let (app, state) = setup_test_app();
    state.probes.set_ready(true).await;
    state
        .probes
        .set_unhealthy(components::ROUTING, "no path between C0 and C1")
        .await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("routing"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, state) = setup_test_app();
    state.metrics.inc_reroutes();
    state.metrics.set_links_monitored(12);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("fabric_reroutes_total 1"));
    assert!(body.contains("fabric_links_monitored 12"));
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _) = setup_test_app();
    let (status, _) = get(app, "/routes").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
