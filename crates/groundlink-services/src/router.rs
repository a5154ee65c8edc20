//! Inbound message routing.
//!
//! The router owns the resync cursor: chunks go in, typed messages come out.
//! It also decides which remote system/component this station talks to.

use groundlink_core::mav::MAV_AUTOPILOT_INVALID;
use groundlink_core::wire::Frame;
use groundlink_core::{Endpoint, FrameReader, Message};

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub sender: Endpoint,
    pub sequence: u8,
    pub message: Message,
    /// Set when this frame changed the peer identity.
    pub peer_update: Option<Endpoint>,
}

#[derive(Debug)]
pub struct MessageRouter {
    reader: FrameReader,
    local: Endpoint,
    default_target: Endpoint,
    peer: Option<Endpoint>,
}

impl MessageRouter {
    pub fn new(local: Endpoint, default_target: Endpoint) -> Self {
        Self {
            reader: FrameReader::new(),
            local,
            default_target,
            peer: None,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.reader.push(chunk);
    }

    /// Next routable message in the buffer.
    ///
    /// Frames from our own system id (echoes on a shared bus) and frames
    /// whose payload does not decode are skipped.
    pub fn next(&mut self) -> Option<Routed> {
        while let Some(frame) = self.reader.next_frame() {
            if frame.sender.system_id == self.local.system_id {
                tracing::trace!(sender = ?frame.sender, "ignoring frame from own system id");
                continue;
            }
            let message = match Message::decode(frame.message_id, &frame.payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::trace!(
                        message_id = frame.message_id,
                        error = %e,
                        "dropping undecodable payload"
                    );
                    continue;
                }
            };
            let peer_update = self.track_peer(&frame, &message);
            return Some(Routed {
                sender: frame.sender,
                sequence: frame.sequence,
                message,
                peer_update,
            });
        }
        None
    }

    /// The vehicle commands go to: the learned peer, else the configured default.
    pub fn target(&self) -> Endpoint {
        self.peer.unwrap_or(self.default_target)
    }

    pub fn peer(&self) -> Option<Endpoint> {
        self.peer
    }

    /// Bytes skipped as noise since the router was created.
    pub fn discarded(&self) -> u64 {
        self.reader.discarded()
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn reset(&mut self) {
        self.reader = FrameReader::new();
        self.peer = None;
    }

    fn track_peer(&mut self, frame: &Frame, message: &Message) -> Option<Endpoint> {
        let system_id = frame.sender.system_id;
        if system_id == 0 {
            return None;
        }
        let component_id = match (message, self.peer) {
            // An autopilot heartbeat names the component to command.
            (Message::Heartbeat(hb), _) if hb.autopilot != MAV_AUTOPILOT_INVALID => {
                frame.sender.component_id
            }
            (_, Some(peer)) if peer.system_id == system_id => peer.component_id,
            _ => self.default_target.component_id,
        };
        let candidate = Endpoint::new(system_id, component_id);
        if self.peer == Some(candidate) {
            return None;
        }
        self.peer = Some(candidate);
        tracing::debug!(system_id, component_id, "peer identity updated");
        Some(candidate)
    }
}
