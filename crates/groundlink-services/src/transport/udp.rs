//! UDP transport. Listens on a local port; the remote address is learned from
//! the first datagram that decodes to a frame and latched for the rest of the
//! connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::{Inbound, Opened, TaskGuard, Transport, INBOUND_QUEUE, READ_BUF};
use crate::error::TransportError;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    peer: RwLock<Option<SocketAddr>>,
    closed: AtomicBool,
    reader: TaskGuard,
}

impl UdpTransport {
    /// Bind `addr` with SO_REUSEADDR and start the reader.
    pub fn bind(addr: SocketAddr) -> Result<Opened, TransportError> {
        let open_err = |source| TransportError::Open {
            target: format!("udp:{}", addr),
            source,
        };
        let std_socket = make_socket(addr).map_err(open_err)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(open_err)?);
        let local = socket.local_addr().map_err(open_err)?;

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let handle = tokio::spawn(read_loop(socket.clone(), tx));

        let transport = UdpTransport {
            socket,
            local,
            peer: RwLock::new(None),
            closed: AtomicBool::new(false),
            reader: TaskGuard::new(handle),
        };
        tracing::info!(local = %local, "udp transport listening");
        Ok(Opened {
            transport: Arc::new(transport),
            inbound: rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

fn make_socket(addr: SocketAddr) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

async fn read_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<Inbound>) {
    let mut buf = vec![0u8; READ_BUF];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                let event = Inbound::Data {
                    bytes: Bytes::copy_from_slice(&buf[..n]),
                    from: Some(from),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) if survivable(&e) => {
                tracing::debug!(error = %e, "udp receive error ignored");
            }
            Err(e) => {
                tracing::warn!(error = %e, "udp receive failed");
                let _ = tx
                    .send(Inbound::Closed {
                        error: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        }
    }
}

/// Receive errors that leave the socket usable. Windows reports an ICMP port
/// unreachable from an earlier send as a reset on the next receive.
fn survivable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::Interrupted
    )
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let peer = (*self.peer.read()).ok_or(TransportError::NoPeer)?;
        self.socket.send_to(bytes, peer).await?;
        Ok(())
    }

    fn set_peer(&self, addr: SocketAddr) {
        let mut peer = self.peer.write();
        if peer.is_none() {
            tracing::info!(peer = %addr, "udp peer latched");
            *peer = Some(addr);
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        *self.peer.read()
    }

    fn describe(&self) -> String {
        format!("udp:{}", self.local)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
    }
}
