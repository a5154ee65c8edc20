//! Transport layer: moves opaque bytes between this station and a vehicle.
//!
//! Every transport is a pair: an object implementing [`Transport`] for the
//! write side, and an `mpsc` stream of [`Inbound`] events fed by a reader
//! task. Inbound chunks carry no message boundaries; framing is the router's
//! job. When the reader hits EOF or an error it sends one `Closed` event and
//! stops.

mod memory;
#[cfg(feature = "serial")]
mod serial;
mod tcp;
mod udp;

pub use memory::{memory_pair, MemoryPeer, MemoryTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use groundlink_core::config::{LinkConfig, LinkKind};

use crate::error::TransportError;

/// Depth of the inbound chunk queue per transport.
pub const INBOUND_QUEUE: usize = 256;

/// Read buffer size. Larger than any single frame.
const READ_BUF: usize = 2048;

/// One event from a transport's reader task.
#[derive(Debug)]
pub enum Inbound {
    Data {
        bytes: Bytes,
        /// Datagram source, for transports that have one.
        from: Option<SocketAddr>,
    },
    /// The reader stopped. `error` is `None` on a clean EOF.
    Closed { error: Option<String> },
}

/// Write side of a link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send bytes. Fire-and-forget: success means handed to the OS.
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Latch the remote address for datagram transports. Stream transports
    /// ignore it.
    fn set_peer(&self, _addr: SocketAddr) {}

    /// Current remote address, if known.
    fn peer(&self) -> Option<SocketAddr> {
        None
    }

    /// Short description for logs and status, e.g. "tcp:127.0.0.1:5760".
    fn describe(&self) -> String;

    /// Stop the reader. Later sends fail with `Closed`.
    fn close(&self);
}

/// An open transport and its inbound stream.
pub struct Opened {
    pub transport: Arc<dyn Transport>,
    pub inbound: mpsc::Receiver<Inbound>,
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("transport", &self.transport.describe())
            .finish()
    }
}

/// Aborts a transport's background task when the transport is dropped.
#[derive(Debug)]
struct TaskGuard(parking_lot::Mutex<Option<JoinHandle<()>>>);

impl TaskGuard {
    fn new(handle: JoinHandle<()>) -> Self {
        Self(parking_lot::Mutex::new(Some(handle)))
    }

    fn abort(&self) {
        if let Some(handle) = self.0.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.abort();
    }
}

// ── Connection spec ───────────────────────────────────────────────────────────

/// Where to connect. Parses from `udp:<port>`, `tcp:<host>:<port>`, or
/// `serial:<path>[:<baud>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectionSpec {
    Udp { port: u16 },
    Tcp { host: String, port: u16 },
    Serial { path: String, baud: u32 },
}

impl ConnectionSpec {
    pub fn from_config(link: &LinkConfig) -> Self {
        match link.kind {
            LinkKind::Udp => ConnectionSpec::Udp {
                port: link.udp_port,
            },
            LinkKind::Tcp => ConnectionSpec::Tcp {
                host: link.tcp_host.clone(),
                port: link.tcp_port,
            },
            LinkKind::Serial => ConnectionSpec::Serial {
                path: link.serial_path.clone(),
                baud: link.serial_baud,
            },
        }
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSpec::Udp { port } => write!(f, "udp:{}", port),
            ConnectionSpec::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
            ConnectionSpec::Serial { path, baud } => write!(f, "serial:{}:{}", path, baud),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection spec {0:?}: expected udp:<port>, tcp:<host>:<port> or serial:<path>[:<baud>]")]
pub struct ParseSpecError(String);

impl FromStr for ConnectionSpec {
    type Err = ParseSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSpecError(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(err)?;
        match kind.to_ascii_lowercase().as_str() {
            "udp" => Ok(ConnectionSpec::Udp {
                port: rest.parse().map_err(|_| err())?,
            }),
            "tcp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(err)?;
                if host.is_empty() {
                    return Err(err());
                }
                Ok(ConnectionSpec::Tcp {
                    host: host.to_string(),
                    port: port.parse().map_err(|_| err())?,
                })
            }
            "serial" => {
                // Baud is the last segment only if it is numeric; device paths
                // on some platforms contain colons.
                match rest.rsplit_once(':') {
                    Some((path, baud)) if !path.is_empty() && baud.parse::<u32>().is_ok() => {
                        Ok(ConnectionSpec::Serial {
                            path: path.to_string(),
                            baud: baud.parse().map_err(|_| err())?,
                        })
                    }
                    _ if !rest.is_empty() => Ok(ConnectionSpec::Serial {
                        path: rest.to_string(),
                        baud: 115_200,
                    }),
                    _ => Err(err()),
                }
            }
            _ => Err(err()),
        }
    }
}

// ── Serial device listing ────────────────────────────────────────────────────

/// Whether this build can open `serial:` links.
pub const SERIAL_SUPPORTED: bool = cfg!(feature = "serial");

/// A serial device offered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDevice {
    pub path: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Serial devices present on this host. Blocking; enumeration reads the
/// device tree. Empty without the `serial` feature or when enumeration fails.
pub fn serial_devices() -> Vec<SerialDevice> {
    #[cfg(feature = "serial")]
    {
        serial::list_devices()
    }
    #[cfg(not(feature = "serial"))]
    {
        Vec::new()
    }
}

/// Open the transport described by `spec`.
pub async fn open(spec: &ConnectionSpec, connect_timeout: Duration) -> Result<Opened, TransportError> {
    match spec {
        ConnectionSpec::Udp { port } => {
            let addr = SocketAddr::from(([0, 0, 0, 0], *port));
            UdpTransport::bind(addr)
        }
        ConnectionSpec::Tcp { host, port } => TcpTransport::connect(host, *port, connect_timeout).await,
        ConnectionSpec::Serial { path, baud } => open_serial(path, *baud),
    }
}

#[cfg(feature = "serial")]
fn open_serial(path: &str, baud: u32) -> Result<Opened, TransportError> {
    SerialTransport::open(path, baud)
}

#[cfg(not(feature = "serial"))]
fn open_serial(_path: &str, _baud: u32) -> Result<Opened, TransportError> {
    Err(TransportError::SerialUnsupported)
}
