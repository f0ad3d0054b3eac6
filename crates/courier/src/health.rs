//! Liveness and readiness endpoints for the orchestrator process.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: u64,
}

#[derive(Clone, Copy)]
struct HealthState {
    started: Instant,
}

impl HealthState {
    fn report(&self, status: &str) -> Json<HealthResponse> {
        let uptime = self.started.elapsed();
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime: format_uptime(uptime),
            uptime_seconds: uptime.as_secs(),
        })
    }
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    state.report("UP")
}

async fn ready(State(state): State<HealthState>) -> Json<HealthResponse> {
    state.report("READY")
}

async fn live(State(state): State<HealthState>) -> Json<HealthResponse> {
    state.report("LIVE")
}

/// `/health`, `/health/ready` and `/health/live`, measuring uptime from `started`.
pub fn router(started: Instant) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
        .with_state(HealthState { started })
}

/// `1d 2h 3m 4s`, dropping leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Serve the health router until `shutdown` is cancelled.
pub async fn serve(port: u16, started: Instant, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");

    axum::serve(listener, router(started))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("health server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_uptime(Duration::from_secs(3_600)), "1h 0m 0s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn test_response_field_names() {
        let response = HealthResponse {
            status: "UP".to_string(),
            version: "0.1.0".to_string(),
            uptime: "5s".to_string(),
            uptime_seconds: 5,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["uptimeSeconds"], 5);
        assert!(json.get("uptime_seconds").is_none());
    }
}
