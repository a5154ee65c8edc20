//! /status, /telemetry, /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use groundlink_services::{LinkSnapshot, TelemetrySnapshot};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<LinkSnapshot> {
    Json(state.link.snapshot())
}

// ── /telemetry ───────────────────────────────────────────────────────────────

pub async fn handle_telemetry(State(state): State<ApiState>) -> Json<TelemetrySnapshot> {
    Json(state.telemetry.snapshot())
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());
    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
