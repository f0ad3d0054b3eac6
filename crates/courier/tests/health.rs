//! Health router answered in-process.

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use common::{body_json, get};
use courier::health::router;

#[tokio::test]
async fn health_reports_up() {
    let response = get(router(Instant::now()), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "UP");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime"].as_str().unwrap().ends_with('s'));
    assert!(json["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn ready_and_live_statuses() {
    let started = Instant::now();

    let ready = body_json(get(router(started), "/health/ready").await).await;
    assert_eq!(ready["status"], "READY");

    let live = body_json(get(router(started), "/health/live").await).await;
    assert_eq!(live["status"], "LIVE");
}

#[tokio::test]
async fn uptime_counts_from_start() {
    let Some(started) = Instant::now().checked_sub(Duration::from_secs(125)) else {
        return;
    };
    let json = body_json(get(router(started), "/health").await).await;

    assert_eq!(json["uptime"], "2m 5s");
    assert_eq!(json["uptimeSeconds"], 125);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let response = get(router(Instant::now()), "/metrics").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
