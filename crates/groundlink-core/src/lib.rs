//! groundlink-core: wire format, typed payloads, mission model, and config.
//! Every other groundlink crate depends on this one. Nothing here does I/O
//! except config loading and plan file helpers.

pub mod config;
pub mod mav;
pub mod message;
pub mod mission;
pub mod wire;

pub use message::Message;
pub use mission::{MissionPlan, Waypoint};
pub use wire::{Decoded, Endpoint, Frame, FrameReader, WireError};
