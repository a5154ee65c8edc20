//! Groundlink wire format: v1 framing, checksum, and the resync cursor.
//!
//! A frame on the wire is:
//!
//! ```text
//! [0xFE][len][seq][sysid][compid][msgid][payload: len bytes][crc: u16 LE]
//! ```
//!
//! The checksum is CRC-16/MCRF4XX over every byte after the start marker,
//! folded once more with a per-message "crc extra" constant. The constant is
//! what lets a receiver reject a frame whose layout it does not agree on, so
//! a frame with an unregistered message id cannot be validated and is treated
//! as noise. A checksum mismatch is never an error for the caller: the bytes
//! are skipped and scanning continues.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Start-of-frame marker for v1 frames.
pub const FRAME_START: u8 = 0xFE;

/// Marker + len + seq + sysid + compid + msgid.
pub const HEADER_LEN: usize = 6;

pub const CHECKSUM_LEN: usize = 2;

/// Largest payload a one-byte length field can describe.
pub const MAX_PAYLOAD: usize = 255;

pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD + CHECKSUM_LEN;

/// System id this station uses when it does not have a configured one.
pub const GCS_SYSTEM_ID: u8 = 255;

/// MAV_COMP_ID_MISSIONPLANNER: the conventional ground station component.
pub const GCS_COMPONENT_ID: u8 = 190;

/// Message ids understood by this link.
pub mod ids {
    pub const HEARTBEAT: u8 = 0;
    pub const SYS_STATUS: u8 = 1;
    pub const GPS_RAW_INT: u8 = 24;
    pub const ATTITUDE: u8 = 30;
    pub const GLOBAL_POSITION_INT: u8 = 33;
    pub const MISSION_REQUEST: u8 = 40;
    pub const MISSION_CURRENT: u8 = 42;
    pub const MISSION_REQUEST_LIST: u8 = 43;
    pub const MISSION_COUNT: u8 = 44;
    pub const MISSION_CLEAR_ALL: u8 = 45;
    pub const MISSION_ACK: u8 = 47;
    pub const MISSION_REQUEST_INT: u8 = 51;
    pub const MISSION_ITEM_INT: u8 = 73;
    pub const VFR_HUD: u8 = 74;
    pub const COMMAND_LONG: u8 = 76;
    pub const COMMAND_ACK: u8 = 77;
    pub const BATTERY_STATUS: u8 = 147;
    pub const STATUSTEXT: u8 = 253;
}

/// The crc-extra constant for a message id, or `None` if the id is not part
/// of this link's dialect. These values are a wire contract with the vehicle.
pub fn crc_extra(message_id: u8) -> Option<u8> {
    let extra = match message_id {
        ids::HEARTBEAT => 50,
        ids::SYS_STATUS => 124,
        ids::GPS_RAW_INT => 24,
        ids::ATTITUDE => 39,
        ids::GLOBAL_POSITION_INT => 104,
        ids::MISSION_REQUEST => 230,
        ids::MISSION_CURRENT => 28,
        ids::MISSION_REQUEST_LIST => 132,
        ids::MISSION_COUNT => 221,
        ids::MISSION_CLEAR_ALL => 232,
        ids::MISSION_ACK => 153,
        ids::MISSION_REQUEST_INT => 196,
        ids::MISSION_ITEM_INT => 38,
        ids::VFR_HUD => 20,
        ids::COMMAND_LONG => 152,
        ids::COMMAND_ACK => 143,
        ids::BATTERY_STATUS => 154,
        ids::STATUSTEXT => 83,
        _ => return None,
    };
    Some(extra)
}

// ── Checksum ──────────────────────────────────────────────────────────────────

/// Fold one byte into a running CRC-16/MCRF4XX.
#[inline]
pub fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xff) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// CRC-16/MCRF4XX of a byte slice (init 0xFFFF, no final xor).
pub fn crc_calculate(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, &b| crc_accumulate(b, crc))
}

/// Frame checksum: `covered` is everything between the start marker and the
/// checksum field.
pub fn frame_checksum(covered: &[u8], extra: u8) -> u16 {
    crc_accumulate(extra, crc_calculate(covered))
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A (system id, component id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub system_id: u8,
    pub component_id: u8,
}

impl Endpoint {
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }

    /// The default identity of this station.
    pub const fn ground_station() -> Self {
        Self::new(GCS_SYSTEM_ID, GCS_COMPONENT_ID)
    }
}

/// One validated frame. The payload is exactly `len` bytes as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub sender: Endpoint,
    pub message_id: u8,
    pub payload: Bytes,
}

/// Result of one decode attempt at the head of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid frame occupying the first `consumed` bytes.
    Frame(Frame, usize),
    /// The head looks like a frame but the buffer ends before it does.
    NeedMoreBytes,
    /// The head is not a valid frame. Skip one byte and try again.
    Invalid,
}

/// Encode a frame. Deterministic for identical inputs.
pub fn encode_frame(
    message_id: u8,
    sequence: u8,
    sender: Endpoint,
    payload: &[u8],
) -> Result<Bytes, WireError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    let extra = crc_extra(message_id).ok_or(WireError::UnknownMessage(message_id))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    out.push(FRAME_START);
    out.push(payload.len() as u8);
    out.push(sequence);
    out.push(sender.system_id);
    out.push(sender.component_id);
    out.push(message_id);
    out.extend_from_slice(payload);

    let crc = frame_checksum(&out[1..], extra);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(Bytes::from(out))
}

/// Try to decode one frame from the start of `buf`.
pub fn try_decode(buf: &[u8]) -> Decoded {
    let Some(&first) = buf.first() else {
        return Decoded::NeedMoreBytes;
    };
    if first != FRAME_START {
        return Decoded::Invalid;
    }
    if buf.len() < HEADER_LEN {
        return Decoded::NeedMoreBytes;
    }

    let len = buf[1] as usize;
    let message_id = buf[5];
    let Some(extra) = crc_extra(message_id) else {
        return Decoded::Invalid;
    };

    let total = HEADER_LEN + len + CHECKSUM_LEN;
    if buf.len() < total {
        return Decoded::NeedMoreBytes;
    }

    let body_end = HEADER_LEN + len;
    let expected = frame_checksum(&buf[1..body_end], extra);
    let received = u16::from_le_bytes([buf[body_end], buf[body_end + 1]]);
    if expected != received {
        return Decoded::Invalid;
    }

    let frame = Frame {
        sequence: buf[2],
        sender: Endpoint::new(buf[3], buf[4]),
        message_id,
        payload: Bytes::copy_from_slice(&buf[HEADER_LEN..body_end]),
    };
    Decoded::Frame(frame, total)
}

// ── Resync cursor ─────────────────────────────────────────────────────────────

/// Accumulates inbound chunks and yields whole frames.
///
/// Chunk boundaries carry no meaning: a frame may arrive split across any
/// number of chunks, and a chunk may hold several frames surrounded by noise.
/// `position` counts every byte the reader has moved past and never goes
/// backwards.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
    position: u64,
    discarded: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` once the buffer needs more bytes.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match try_decode(&self.buf) {
                Decoded::Frame(frame, consumed) => {
                    self.advance(consumed);
                    return Some(frame);
                }
                Decoded::NeedMoreBytes => return None,
                Decoded::Invalid => {
                    // Skip the bad byte plus anything up to the next marker.
                    let skip = self.buf[1..]
                        .iter()
                        .position(|&b| b == FRAME_START)
                        .map_or(self.buf.len(), |i| i + 1);
                    self.discarded += skip as u64;
                    self.advance(skip);
                }
            }
        }
    }

    /// Total bytes consumed so far, frames and noise alike.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes skipped as noise.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes held waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.position += self.buf.len() as u64;
        self.buf.clear();
    }

    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.position += n as u64;
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when producing or interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("message id {0} is not part of this dialect")]
    UnknownMessage(u8),

    #[error("payload for message {id} is {len} bytes, need at least {min}")]
    PayloadTooShort { id: u8, len: usize, min: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
