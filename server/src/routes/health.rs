use axum::Json;
use axum::extract::State;
use chrono::Utc;
use pipeflow_protocol::responses::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let in_flight_jobs = state.jobs().count_active().await.unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        service: "pipeflow",
        version: env!("CARGO_PKG_VERSION"),
        architecture: std::env::consts::ARCH,
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        in_flight_jobs,
    })
}
