//! groundlink-services: the live side of the link. Transports, routing,
//! command dispatch, mission transfer, and the supervisor task that owns them.

pub mod command;
pub mod error;
pub mod event;
pub mod link;
pub mod link_state;
pub mod mission_transfer;
pub mod router;
pub mod telemetry;
pub mod transport;

pub use command::Command;
pub use error::{LinkError, TransferFailure, TransportError};
pub use event::{ConnectionStatus, LinkEvent, TransferDirection};
pub use link::{LinkHandle, LinkSettings, LinkSupervisor};
pub use link_state::LinkSnapshot;
pub use telemetry::{TelemetryRecorder, TelemetrySnapshot, TelemetryStore};
pub use transport::ConnectionSpec;
