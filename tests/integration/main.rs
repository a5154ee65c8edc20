//! Groundlink integration test harness.
//!
//! Every test runs a link supervisor against an in-process simulated
//! autopilot over real loopback sockets (UDP or TCP). No external setup is
//! needed:
//!
//!   cargo test --test integration
//!
//! Each test binds its own ephemeral ports, so tests may run in parallel.

mod commands;
mod infra;
mod link;
mod missions;

pub use infra::*;
