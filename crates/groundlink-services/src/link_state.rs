//! Connection state owned by the link supervisor.
//!
//! Fields are private; the supervisor drives every change through the
//! transition methods below so that status, peer identity and liveness stay
//! consistent with each other.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use groundlink_core::Endpoint;

use crate::event::ConnectionStatus;
use crate::mission_transfer::TransferStatus;

#[derive(Debug)]
pub struct LinkState {
    status: ConnectionStatus,
    description: Option<String>,
    peer_addr: Option<SocketAddr>,
    peer: Option<Endpoint>,
    connected_at: Option<Instant>,
    last_heartbeat: Option<Instant>,
    stale: bool,
    sequence: u8,
    frames_received: u64,
    frames_sent: u64,
}

/// Point-in-time view for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSnapshot {
    pub status: ConnectionStatus,
    pub transport: Option<String>,
    pub peer_addr: Option<SocketAddr>,
    pub peer: Option<Endpoint>,
    pub connected_for_ms: Option<u64>,
    pub since_heartbeat_ms: Option<u64>,
    pub stale: bool,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_discarded: u64,
    pub transfer: Option<TransferStatus>,
}

impl Default for LinkSnapshot {
    fn default() -> Self {
        LinkState::new().snapshot(Instant::now(), 0)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            description: None,
            peer_addr: None,
            peer: None,
            connected_at: None,
            last_heartbeat: None,
            stale: false,
            sequence: 0,
            frames_received: 0,
            frames_sent: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status != ConnectionStatus::Disconnected
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn peer(&self) -> Option<Endpoint> {
        self.peer
    }

    /// A transport is open; nothing has been heard yet.
    pub fn begin_connecting(&mut self, description: String) {
        *self = Self::new();
        self.status = ConnectionStatus::Connecting;
        self.description = Some(description);
    }

    /// First valid frame arrived. Returns true on the transition.
    pub fn mark_connected(&mut self, now: Instant) -> bool {
        if self.status != ConnectionStatus::Connecting {
            return false;
        }
        self.status = ConnectionStatus::Connected;
        self.connected_at = Some(now);
        true
    }

    /// Record the datagram source. Only the first address sticks.
    pub fn latch_peer_addr(&mut self, addr: SocketAddr) -> bool {
        if self.peer_addr.is_some() {
            return false;
        }
        self.peer_addr = Some(addr);
        true
    }

    /// Returns true when the identity changed.
    pub fn set_peer(&mut self, peer: Endpoint) -> bool {
        if self.peer == Some(peer) {
            return false;
        }
        self.peer = Some(peer);
        true
    }

    pub fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    /// Note a vehicle heartbeat. Returns true if this ends a stale period.
    pub fn record_heartbeat(&mut self, now: Instant) -> bool {
        self.last_heartbeat = Some(now);
        std::mem::replace(&mut self.stale, false)
    }

    /// Returns the silence length the first time the link goes stale.
    /// Silence is measured from the later of connection and last heartbeat.
    pub fn check_liveness(&mut self, now: Instant, stale_after: Duration) -> Option<Duration> {
        if !self.is_connected() || self.stale {
            return None;
        }
        let since = self.last_heartbeat.or(self.connected_at)?;
        let silent = now.saturating_duration_since(since);
        if silent >= stale_after {
            self.stale = true;
            Some(silent)
        } else {
            None
        }
    }

    /// Sequence number for the next outbound frame. Wraps at 256.
    pub fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        self.frames_sent += 1;
        seq
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self, now: Instant, bytes_discarded: u64) -> LinkSnapshot {
        let millis = |t: Instant| now.saturating_duration_since(t).as_millis() as u64;
        LinkSnapshot {
            status: self.status,
            transport: self.description.clone(),
            peer_addr: self.peer_addr,
            peer: self.peer,
            connected_for_ms: self.connected_at.map(millis),
            since_heartbeat_ms: self.last_heartbeat.map(millis),
            stale: self.stale,
            frames_received: self.frames_received,
            frames_sent: self.frames_sent,
            bytes_discarded,
            transfer: None,
        }
    }
}
