//! Typed events published by the link supervisor.
//!
//! Consumers subscribe through `LinkHandle::subscribe`. The channel is a
//! broadcast: a slow consumer loses old events rather than stalling the link.

use serde::Serialize;

use groundlink_core::mav::MavCmd;
use groundlink_core::message::{
    Attitude, BatteryStatus, CommandAck, GlobalPosition, GpsRaw, Heartbeat, StatusText, SysStatus,
    VfrHud,
};
use groundlink_core::{Endpoint, MissionPlan};

use crate::error::TransferFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
    Clear,
}

/// What a successful transfer produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferCompleted {
    Uploaded { count: usize },
    Downloaded { plan: MissionPlan },
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    ConnectionChanged {
        status: ConnectionStatus,
        /// Human-readable transport, e.g. "udp:0.0.0.0:14550".
        description: Option<String>,
        /// Set when the link dropped because of a failure.
        error: Option<String>,
    },
    PeerIdentified {
        peer: Endpoint,
    },
    LinkStale {
        silent_for_ms: u64,
    },
    LinkRestored,
    Heartbeat {
        from: Endpoint,
        heartbeat: Heartbeat,
        armed: bool,
        mode: Option<&'static str>,
    },
    SystemStatus(SysStatus),
    Attitude(Attitude),
    GlobalPosition(GlobalPosition),
    GpsRaw(GpsRaw),
    VfrHud(VfrHud),
    Battery(BatteryStatus),
    StatusText(StatusText),
    CommandAck(CommandAck),
    CommandTimeout {
        command: MavCmd,
    },
    MissionCurrent {
        seq: u16,
    },
    MissionProgress {
        direction: TransferDirection,
        done: u16,
        total: u16,
    },
    MissionTransferFinished {
        direction: TransferDirection,
        outcome: TransferOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransferOutcome {
    Completed { items: usize },
    Failed { failure: TransferFailure },
}

impl TransferOutcome {
    pub fn from_result(result: &Result<TransferCompleted, TransferFailure>) -> Self {
        match result {
            Ok(TransferCompleted::Uploaded { count }) => Self::Completed { items: *count },
            Ok(TransferCompleted::Downloaded { plan }) => Self::Completed { items: plan.len() },
            Ok(TransferCompleted::Cleared) => Self::Completed { items: 0 },
            Err(failure) => Self::Failed {
                failure: failure.clone(),
            },
        }
    }
}
