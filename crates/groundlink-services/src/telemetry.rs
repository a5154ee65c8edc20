//! Latest-value telemetry store fed from the link event stream.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use groundlink_core::message::{
    Attitude, BatteryStatus, CommandAck, GlobalPosition, GpsRaw, Heartbeat, StatusText, SysStatus,
    VfrHud,
};
use groundlink_core::Endpoint;

use crate::event::{ConnectionStatus, LinkEvent};

/// Status texts kept, newest last.
pub const STATUS_TEXT_LOG: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleHeartbeat {
    pub from: Endpoint,
    pub armed: bool,
    pub mode: Option<&'static str>,
    #[serde(flatten)]
    pub heartbeat: Heartbeat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub heartbeat: Option<VehicleHeartbeat>,
    pub system_status: Option<SysStatus>,
    pub attitude: Option<Attitude>,
    pub position: Option<GlobalPosition>,
    pub gps: Option<GpsRaw>,
    pub vfr_hud: Option<VfrHud>,
    pub battery: Option<BatteryStatus>,
    pub mission_current: Option<u16>,
    pub last_command_ack: Option<CommandAck>,
    pub status_texts: VecDeque<StatusText>,
}

/// Shared, cheap to clone.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<RwLock<TelemetrySnapshot>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the store. Events that carry no telemetry are ignored.
    pub fn apply(&self, event: &LinkEvent) {
        let mut t = self.inner.write();
        match event {
            LinkEvent::Heartbeat {
                from,
                heartbeat,
                armed,
                mode,
            } => {
                t.heartbeat = Some(VehicleHeartbeat {
                    from: *from,
                    armed: *armed,
                    mode: *mode,
                    heartbeat: *heartbeat,
                })
            }
            LinkEvent::SystemStatus(s) => t.system_status = Some(*s),
            LinkEvent::Attitude(a) => t.attitude = Some(*a),
            LinkEvent::GlobalPosition(p) => t.position = Some(*p),
            LinkEvent::GpsRaw(g) => t.gps = Some(*g),
            LinkEvent::VfrHud(v) => t.vfr_hud = Some(*v),
            LinkEvent::Battery(b) => t.battery = Some(b.clone()),
            LinkEvent::CommandAck(ack) => t.last_command_ack = Some(*ack),
            LinkEvent::MissionCurrent { seq } => t.mission_current = Some(*seq),
            LinkEvent::StatusText(text) => {
                if t.status_texts.len() == STATUS_TEXT_LOG {
                    t.status_texts.pop_front();
                }
                t.status_texts.push_back(text.clone());
            }
            // Vehicle state goes stale with the link; the text log stays.
            LinkEvent::ConnectionChanged {
                status: ConnectionStatus::Disconnected,
                ..
            } => {
                let texts = std::mem::take(&mut t.status_texts);
                *t = TelemetrySnapshot {
                    status_texts: texts,
                    ..TelemetrySnapshot::default()
                };
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.read().clone()
    }
}

/// Task that keeps a [`TelemetryStore`] current.
pub struct TelemetryRecorder {
    store: TelemetryStore,
    events: broadcast::Receiver<LinkEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl TelemetryRecorder {
    pub fn new(
        store: TelemetryStore,
        events: broadcast::Receiver<LinkEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("telemetry recorder shutting down");
                    return Ok(());
                }

                event = self.events.recv() => match event {
                    Ok(event) => self.store.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "telemetry recorder lagged behind link events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("link event stream closed, telemetry recorder exiting");
                        return Ok(());
                    }
                },
            }
        }
    }
}
