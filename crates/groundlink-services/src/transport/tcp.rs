//! TCP client transport, e.g. to a SITL instance on port 5760.
//!
//! Writes go through a bounded queue to a writer task, so a peer that stops
//! reading fills the queue instead of stalling the caller. A write that makes
//! no progress for [`WRITE_TIMEOUT`] closes the link.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{Inbound, Opened, TaskGuard, Transport, INBOUND_QUEUE, READ_BUF};
use crate::error::TransportError;

/// Frames waiting for the writer task.
const OUTBOUND_QUEUE: usize = 64;

/// Longest a single frame write may stall before the link is closed.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TcpTransport {
    outbound: mpsc::Sender<Bytes>,
    remote: SocketAddr,
    closed: AtomicBool,
    reader: TaskGuard,
    writer: TaskGuard,
}

impl TcpTransport {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Opened, TransportError> {
        let target = format!("{}:{}", host, port);
        let open_err = |source| TransportError::Open {
            target: format!("tcp:{}", target),
            source,
        };
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
            Ok(result) => result.map_err(open_err)?,
            Err(_) => {
                return Err(open_err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Opened, TransportError> {
        stream.set_nodelay(true)?;
        let remote = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let writer = tokio::spawn(write_loop(write_half, outbound_rx, tx.clone()));
        let reader = tokio::spawn(read_loop(read_half, tx));

        tracing::info!(remote = %remote, "tcp transport connected");
        let transport = TcpTransport {
            outbound,
            remote,
            closed: AtomicBool::new(false),
            reader: TaskGuard::new(reader),
            writer: TaskGuard::new(writer),
        };
        Ok(Opened {
            transport: Arc::new(transport),
            inbound: rx,
        })
    }
}

async fn read_loop(mut stream: OwnedReadHalf, tx: mpsc::Sender<Inbound>) {
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let event = match stream.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("tcp peer closed the connection");
                let _ = tx.send(Inbound::Closed { error: None }).await;
                return;
            }
            Ok(n) => Inbound::Data {
                bytes: Bytes::copy_from_slice(&buf[..n]),
                from: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "tcp read failed");
                let _ = tx
                    .send(Inbound::Closed {
                        error: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn write_loop(mut stream: OwnedWriteHalf, mut frames: mpsc::Receiver<Bytes>, inbound: mpsc::Sender<Inbound>) {
    while let Some(frame) = frames.recv().await {
        let error = match tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(&frame)).await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write stalled for {:?}, peer is not reading", WRITE_TIMEOUT),
        };
        tracing::warn!(error = %error, "tcp write failed");
        let _ = inbound.send(Inbound::Closed { error: Some(error) }).await;
        return;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        match self.outbound.try_send(Bytes::copy_from_slice(bytes)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::Backlogged),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.remote)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.writer.abort();
    }
}
