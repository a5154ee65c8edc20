//! /connect, /disconnect, /command, /link/ports handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use groundlink_services::transport::{self, SerialDevice};
use groundlink_services::{Command, ConnectionSpec};

use super::{bad_request, link_error, ApiState};

// ── /link/ports (GET) ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PortsResponse {
    pub serial_supported: bool,
    pub ports: Vec<SerialDevice>,
}

pub async fn handle_ports() -> Result<Json<PortsResponse>, (StatusCode, String)> {
    let ports = tokio::task::spawn_blocking(transport::serial_devices)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(PortsResponse {
        serial_supported: transport::SERIAL_SUPPORTED,
        ports,
    }))
}

// ── /connect (POST) ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConnectRequest {
    /// e.g. "udp:14550", "tcp:127.0.0.1:5760", "serial:/dev/ttyUSB0:57600".
    /// Absent means the configured link.
    #[serde(default)]
    pub spec: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub transport: String,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, (StatusCode, String)> {
    let spec = match req.spec.as_deref() {
        Some(text) => text.parse::<ConnectionSpec>().map_err(bad_request)?,
        None => state.default_connection.clone(),
    };
    tracing::info!(%spec, "connect requested via API");
    let transport = state.link.connect(spec).await.map_err(link_error)?;
    Ok(Json(ConnectResponse { transport }))
}

// ── /disconnect (POST) ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub was_connected: bool,
}

pub async fn handle_disconnect(
    State(state): State<ApiState>,
) -> Result<Json<DisconnectResponse>, (StatusCode, String)> {
    let was_connected = state.link.disconnect().await.map_err(link_error)?;
    Ok(Json(DisconnectResponse { was_connected }))
}

// ── /command (POST) ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub arg: Option<String>,
}

#[derive(Serialize)]
pub struct CommandResponse {
    /// What went out, e.g. "takeoff 20m". Acks arrive later as telemetry.
    pub sent: String,
}

pub async fn handle_command(
    State(state): State<ApiState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    let command = Command::parse(&req.command, req.arg.as_deref(), state.default_takeoff_altitude)
        .map_err(link_error)?;
    state.link.send_command(command).await.map_err(link_error)?;
    Ok(Json(CommandResponse {
        sent: command.to_string(),
    }))
}
