//! Error taxonomy for the link layer.
//!
//! `TransportError` covers byte movement, `TransferFailure` is why a mission
//! transfer ended early, and `LinkError` is what a caller of `LinkHandle` sees.

use groundlink_core::mav::MissionResult;
use groundlink_core::WireError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no peer address yet; waiting for the vehicle to send first")]
    NoPeer,

    #[error("transport closed")]
    Closed,

    #[error("send queue full; the peer is not reading")]
    Backlogged,

    #[error("serial support not compiled in (enable the `serial` feature)")]
    SerialUnsupported,

    #[error("serial port {path}: {reason}")]
    Serial { path: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a mission transfer did not complete. Partial items are never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransferFailure {
    #[error("timed out waiting for {stage}")]
    Timeout { stage: &'static str },

    #[error("vehicle rejected the transfer: {result}")]
    Rejected { result: MissionResult },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("link closed during transfer")]
    LinkClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("not connected to a vehicle")]
    NotConnected,

    #[error("a mission transfer is already in progress")]
    TransferInProgress,

    #[error("no mission transfer in progress")]
    NoTransfer,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("mission transfer failed: {0}")]
    Transfer(#[from] TransferFailure),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("link supervisor is not running")]
    SupervisorGone,
}

impl LinkError {
    /// True when retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::NotConnected
                | LinkError::TransferInProgress
                | LinkError::Transfer(TransferFailure::Timeout { .. })
                | LinkError::Transfer(TransferFailure::LinkClosed)
                | LinkError::Transport(TransportError::NoPeer)
                | LinkError::Transport(TransportError::Backlogged)
        )
    }
}
