//! Event logger: turns link events into log lines.
//!
//! Telemetry is high-rate and goes to trace; state changes and anything the
//! operator has to act on are info or above.

use tokio::sync::broadcast;

use groundlink_core::mav::Severity;
use groundlink_services::event::{ConnectionStatus, TransferOutcome};
use groundlink_services::LinkEvent;

pub struct EventLogger {
    events: broadcast::Receiver<LinkEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl EventLogger {
    pub fn new(events: broadcast::Receiver<LinkEvent>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { events, shutdown }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("event logger shutting down");
                    return Ok(());
                }

                event = self.events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event logger lagged behind link events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("link event stream closed, event logger exiting");
                        return Ok(());
                    }
                },
            }
        }
    }
}

fn log_event(event: &LinkEvent) {
    match event {
        LinkEvent::ConnectionChanged {
            status,
            description,
            error: Some(error),
        } => tracing::warn!(?status, transport = ?description, %error, "link state changed"),
        LinkEvent::ConnectionChanged {
            status: ConnectionStatus::Connected,
            description,
            ..
        } => tracing::info!(transport = ?description, "vehicle link up"),
        LinkEvent::ConnectionChanged {
            status, description, ..
        } => tracing::info!(?status, transport = ?description, "link state changed"),
        LinkEvent::PeerIdentified { peer } => tracing::info!(
            system_id = peer.system_id,
            component_id = peer.component_id,
            "vehicle identified"
        ),
        LinkEvent::LinkStale { silent_for_ms } => {
            tracing::warn!(silent_for_ms, "no heartbeat from vehicle")
        }
        LinkEvent::LinkRestored => tracing::info!("vehicle heartbeat restored"),
        LinkEvent::StatusText(text) => match text.severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                tracing::error!(severity = %text.severity, "vehicle: {}", text.text)
            }
            Severity::Warning => tracing::warn!("vehicle: {}", text.text),
            Severity::Debug => tracing::debug!("vehicle: {}", text.text),
            _ => tracing::info!(severity = %text.severity, "vehicle: {}", text.text),
        },
        LinkEvent::CommandAck(ack) => {
            tracing::info!(command = %ack.command, result = %ack.result, "command acknowledged")
        }
        LinkEvent::CommandTimeout { command } => {
            tracing::warn!(command = %command, "no acknowledgement for command")
        }
        LinkEvent::MissionProgress {
            direction,
            done,
            total,
        } => tracing::debug!(?direction, done, total, "mission transfer progress"),
        LinkEvent::MissionTransferFinished {
            direction,
            outcome: TransferOutcome::Completed { items },
        } => tracing::info!(?direction, items, "mission transfer complete"),
        LinkEvent::MissionTransferFinished {
            direction,
            outcome: TransferOutcome::Failed { failure },
        } => tracing::warn!(?direction, %failure, "mission transfer failed"),
        LinkEvent::MissionCurrent { seq } => tracing::debug!(seq, "mission item reached"),
        other => tracing::trace!(event = ?other, "telemetry"),
    }
}
