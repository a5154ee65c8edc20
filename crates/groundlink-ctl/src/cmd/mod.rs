//! CLI command modules.

pub mod http;
pub mod link;
pub mod mission;
pub mod status;
