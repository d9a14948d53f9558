use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::AdminState;
use crate::health::report::HealthReport;
use crate::health::stats::ErrorStats;
use crate::resilience::circuit_breaker::BreakerStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breakers: usize,
}

#[derive(Serialize)]
pub struct ResetAck {
    pub reset: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        breakers: state.resilience.breakers().len(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<ErrorStats> {
    Json(state.resilience.error_stats())
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerStatus>> {
    Json(state.resilience.circuit_breaker_statuses())
}

/// 200 when healthy, 503 otherwise; the body is the full report either way.
pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.resilience.error_recovery_health();
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn reset_stats(State(state): State<AdminState>) -> Json<ResetAck> {
    state.resilience.reset_error_stats();
    tracing::info!("Error statistics reset via admin API");
    Json(ResetAck {
        reset: "stats".to_string(),
    })
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, StatusCode> {
    let breaker = state
        .resilience
        .breakers()
        .get(&name)
        .ok_or(StatusCode::NOT_FOUND)?;
    breaker.reset();
    tracing::info!(breaker = %name, "Circuit breaker reset via admin API");
    Ok(Json(breaker.status()))
}
