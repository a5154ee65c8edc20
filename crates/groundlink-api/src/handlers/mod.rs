//! HTTP API handlers: the link, telemetry and mission transfers as JSON.

pub mod link;
pub mod mission;
pub mod status;

use axum::http::StatusCode;

use groundlink_services::{ConnectionSpec, LinkError, LinkHandle, TelemetryStore, TransferFailure, TransportError};

#[derive(Clone)]
pub struct ApiState {
    pub link: LinkHandle,
    pub telemetry: TelemetryStore,
    /// Used by /connect when the request names no transport.
    pub default_connection: ConnectionSpec,
    /// Metres, for `takeoff` without an argument.
    pub default_takeoff_altitude: f32,
    /// Shutdown broadcast sender, signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub fn status_for(err: &LinkError) -> StatusCode {
    match err {
        LinkError::TransferInProgress => StatusCode::CONFLICT,
        LinkError::NotConnected
        | LinkError::Transport(TransportError::NoPeer)
        | LinkError::Transport(TransportError::Backlogged)
        | LinkError::Transfer(TransferFailure::LinkClosed) => StatusCode::SERVICE_UNAVAILABLE,
        LinkError::Transfer(TransferFailure::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        LinkError::Transfer(TransferFailure::Rejected { .. }) | LinkError::Transport(_) => {
            StatusCode::BAD_GATEWAY
        }
        LinkError::Transfer(TransferFailure::Cancelled) => StatusCode::CONFLICT,
        LinkError::UnknownCommand(_) | LinkError::InvalidArgument(_) | LinkError::NoTransfer => {
            StatusCode::BAD_REQUEST
        }
        LinkError::Wire(_) | LinkError::SupervisorGone => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn link_error(err: LinkError) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "API request failed");
    }
    (status, err.to_string())
}

fn bad_request(msg: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.to_string())
}

// Re-export handler functions for use in router setup.
pub use link::{handle_command, handle_connect, handle_disconnect, handle_ports};
pub use mission::{
    handle_mission_cancel, handle_mission_clear, handle_mission_download, handle_mission_survey,
    handle_mission_upload,
};
pub use status::{handle_shutdown, handle_status, handle_telemetry};

/// A state backed by a live supervisor with no transport attached.
#[cfg(test)]
pub(crate) fn test_state() -> ApiState {
    use groundlink_services::{LinkSettings, LinkSupervisor};

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let (supervisor, link) = LinkSupervisor::new(LinkSettings::default(), shutdown_rx);
    tokio::spawn(supervisor.run());
    ApiState {
        link,
        telemetry: TelemetryStore::new(),
        default_connection: ConnectionSpec::Udp { port: 14550 },
        default_takeoff_altitude: 10.0,
        shutdown_tx,
    }
}
